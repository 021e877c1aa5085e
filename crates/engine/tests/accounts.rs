use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    AccountKind, AccountNode, ConversionBatcher, Currency, Engine, EngineError,
    ExchangeRateCache, ExpenseCmd, IncomeCmd, NewAccountCmd, ProviderError, RateProvider,
};
use migration::MigratorTrait;
use uuid::Uuid;

/// Knows USD→EUR only.
struct UsdOnly;

#[async_trait]
impl RateProvider for UsdOnly {
    fn name(&self) -> &str {
        "usd-only"
    }

    async fn latest(&self, base: Currency) -> Result<HashMap<String, f64>, ProviderError> {
        if base == Currency::USD {
            Ok(HashMap::from([("EUR".to_string(), 0.9)]))
        } else {
            Err(ProviderError::UnsupportedPair(base.to_string()))
        }
    }
}

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let backend = db.get_database_backend();
    for user in ["alice", "bob"] {
        db.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO users (username, base_currency) VALUES (?, ?)",
            vec![user.into(), "EUR".into()],
        ))
        .await
        .unwrap();
    }
    let cache = ExchangeRateCache::builder()
        .database(db.clone())
        .primary(Arc::new(UsdOnly))
        .build()
        .unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .converter(Arc::new(ConversionBatcher::new(Arc::new(cache))))
        .build()
        .await
        .unwrap();
    (engine, db)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
}

async fn create(engine: &Engine, cmd: NewAccountCmd) -> Uuid {
    engine.new_account(cmd).await.unwrap()
}

fn find<'a>(nodes: &'a [AccountNode], name: &str) -> &'a AccountNode {
    nodes
        .iter()
        .find(|n| n.account.name == name)
        .unwrap_or_else(|| panic!("node {name} missing"))
}

#[tokio::test]
async fn nesting_is_limited_to_three_levels() {
    let (engine, _db) = engine_with_db().await;
    let expenses = create(
        &engine,
        NewAccountCmd::new("alice", "Expenses", AccountKind::Expense),
    )
    .await;
    let food = create(
        &engine,
        NewAccountCmd::new("alice", "Food", AccountKind::Expense).parent(expenses),
    )
    .await;
    let restaurants = create(
        &engine,
        NewAccountCmd::new("alice", "Restaurants", AccountKind::Expense).parent(food),
    )
    .await;

    assert_eq!(engine.account("alice", expenses).await.unwrap().level, 1);
    assert_eq!(engine.account("alice", food).await.unwrap().level, 2);
    assert_eq!(engine.account("alice", restaurants).await.unwrap().level, 3);

    let err = engine
        .new_account(NewAccountCmd::new("alice", "Sushi", AccountKind::Expense).parent(restaurants))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidHierarchy(_)));
}

#[tokio::test]
async fn parent_must_be_owned_and_of_the_same_kind() {
    let (engine, _db) = engine_with_db().await;
    let assets = create(&engine, NewAccountCmd::new("alice", "Assets", AccountKind::Asset)).await;
    let bobs = create(&engine, NewAccountCmd::new("bob", "Assets", AccountKind::Asset)).await;

    let err = engine
        .new_account(NewAccountCmd::new("alice", "Rent", AccountKind::Expense).parent(assets))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidHierarchy(_)));

    let err = engine
        .new_account(NewAccountCmd::new("alice", "Bank", AccountKind::Asset).parent(bobs))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("account not exists".to_string()));
}

#[tokio::test]
async fn account_fields_are_validated() {
    let (engine, _db) = engine_with_db().await;

    let err = engine
        .new_account(NewAccountCmd::new("alice", "   ", AccountKind::Asset))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .new_account(NewAccountCmd::new("alice", "Food", AccountKind::Expense).wallet(0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let mut cmd = NewAccountCmd::new("alice", "Bank", AccountKind::Asset);
    cmd.opening_balance_minor = 1000;
    let err = engine.new_account(cmd).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .new_account(NewAccountCmd::new("mallory", "Bank", AccountKind::Asset))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Unauthorized);
}

#[tokio::test]
async fn sibling_names_are_unique_ignoring_case() {
    let (engine, _db) = engine_with_db().await;
    let home = create(&engine, NewAccountCmd::new("alice", "Home", AccountKind::Expense)).await;
    let car = create(&engine, NewAccountCmd::new("alice", "Car", AccountKind::Expense)).await;
    create(
        &engine,
        NewAccountCmd::new("alice", "Insurance", AccountKind::Expense).parent(home),
    )
    .await;

    let err = engine
        .new_account(NewAccountCmd::new("alice", "insurance", AccountKind::Expense).parent(home))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));

    let car_insurance = create(
        &engine,
        NewAccountCmd::new("alice", "Insurance", AccountKind::Expense).parent(car),
    )
    .await;
    let err = engine
        .rename_account("alice", car, "HOME")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));

    engine
        .rename_account("alice", car_insurance, "Car insurance")
        .await
        .unwrap();
    assert_eq!(
        engine.account("alice", car_insurance).await.unwrap().name,
        "Car insurance"
    );

    // Bob has his own namespace.
    create(&engine, NewAccountCmd::new("bob", "Home", AccountKind::Expense)).await;
}

#[tokio::test]
async fn move_account_rewrites_subtree_levels() {
    let (engine, _db) = engine_with_db().await;
    let living = create(&engine, NewAccountCmd::new("alice", "Living", AccountKind::Expense)).await;
    let food = create(&engine, NewAccountCmd::new("alice", "Food", AccountKind::Expense)).await;
    let restaurants = create(
        &engine,
        NewAccountCmd::new("alice", "Restaurants", AccountKind::Expense).parent(food),
    )
    .await;
    let salary = create(&engine, NewAccountCmd::new("alice", "Salary", AccountKind::Income)).await;

    engine
        .move_account("alice", food, Some(living))
        .await
        .unwrap();
    let moved = engine.account("alice", food).await.unwrap();
    assert_eq!(moved.parent_id, Some(living));
    assert_eq!(moved.level, 2);
    assert_eq!(engine.account("alice", restaurants).await.unwrap().level, 3);

    let err = engine
        .move_account("alice", living, Some(restaurants))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidHierarchy(_)));

    let err = engine
        .move_account("alice", food, Some(food))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidHierarchy(_)));

    let err = engine
        .move_account("alice", food, Some(salary))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidHierarchy(_)));

    // Snacks already sits at level 3.
    let snacks = create(
        &engine,
        NewAccountCmd::new("alice", "Snacks", AccountKind::Expense).parent(food),
    )
    .await;
    let err = engine
        .move_account("alice", restaurants, Some(snacks))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidHierarchy(_)));

    engine.move_account("alice", food, None).await.unwrap();
    let root = engine.account("alice", food).await.unwrap();
    assert_eq!(root.parent_id, None);
    assert_eq!(root.level, 1);
    assert_eq!(engine.account("alice", restaurants).await.unwrap().level, 2);
    assert_eq!(engine.account("alice", snacks).await.unwrap().level, 2);
}

#[tokio::test]
async fn account_tree_rolls_up_subtree_totals() {
    let (engine, _db) = engine_with_db().await;
    let bank = create(
        &engine,
        NewAccountCmd::new("alice", "Bank", AccountKind::Asset).wallet(10_000),
    )
    .await;
    let salary = create(&engine, NewAccountCmd::new("alice", "Salary", AccountKind::Income)).await;
    let expenses = create(
        &engine,
        NewAccountCmd::new("alice", "Expenses", AccountKind::Expense),
    )
    .await;
    let food = create(
        &engine,
        NewAccountCmd::new("alice", "Food", AccountKind::Expense).parent(expenses),
    )
    .await;
    let restaurants = create(
        &engine,
        NewAccountCmd::new("alice", "Restaurants", AccountKind::Expense).parent(food),
    )
    .await;

    engine
        .record_income(IncomeCmd::new("alice", salary, bank, 5_000, day(1)))
        .await
        .unwrap();
    engine
        .record_expense(ExpenseCmd::new("alice", food, bank, 100, day(2)))
        .await
        .unwrap();
    engine
        .record_expense(ExpenseCmd::new("alice", restaurants, bank, 50, day(3)))
        .await
        .unwrap();

    let tree = engine.account_tree("alice").await.unwrap();
    let names: Vec<&str> = tree.iter().map(|n| n.account.name.as_str()).collect();
    assert_eq!(names, vec!["Bank", "Expenses", "Salary"]);

    let bank_node = find(&tree, "Bank");
    assert_eq!(bank_node.debits_minor, 15_000);
    assert_eq!(bank_node.credits_minor, 150);
    assert_eq!(bank_node.balance_minor, 14_850);

    let salary_node = find(&tree, "Salary");
    assert_eq!(salary_node.balance_minor, 5_000);

    let expenses_node = find(&tree, "Expenses");
    assert_eq!(expenses_node.balance_minor, 0);
    assert_eq!(expenses_node.total_debits_minor, 150);
    assert_eq!(expenses_node.total_balance_minor, 150);
    let food_node = find(&expenses_node.children, "Food");
    assert_eq!(food_node.balance_minor, 100);
    assert_eq!(food_node.total_balance_minor, 150);
    assert_eq!(find(&food_node.children, "Restaurants").total_balance_minor, 50);

    assert!(engine.account_tree("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn overflowing_wallet_balance_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let bank = create(
        &engine,
        NewAccountCmd::new("alice", "Bank", AccountKind::Asset).wallet(i64::MAX),
    )
    .await;
    let salary = create(&engine, NewAccountCmd::new("alice", "Salary", AccountKind::Income)).await;
    engine
        .record_income(IncomeCmd::new("alice", salary, bank, 1, day(1)))
        .await
        .unwrap();

    let err = engine.account_tree("alice").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let err = engine.wallet_balances("alice").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn wallet_balances_are_valued_in_the_base_currency() {
    let (engine, _db) = engine_with_db().await;
    let jpy = Currency::try_from("JPY").unwrap();
    let eur_wallet = create(
        &engine,
        NewAccountCmd::new("alice", "Bank", AccountKind::Asset).wallet(10_000),
    )
    .await;
    let usd_wallet = create(
        &engine,
        NewAccountCmd::new("alice", "Dollars", AccountKind::Asset)
            .currency(Currency::USD)
            .wallet(500),
    )
    .await;
    let yen_wallet = create(
        &engine,
        NewAccountCmd::new("alice", "Yen", AccountKind::Asset)
            .currency(jpy)
            .wallet(3_000),
    )
    .await;
    let closed = create(
        &engine,
        NewAccountCmd::new("alice", "Old", AccountKind::Asset).wallet(1),
    )
    .await;
    create(&engine, NewAccountCmd::new("alice", "Savings", AccountKind::Asset)).await;
    let food = create(&engine, NewAccountCmd::new("alice", "Food", AccountKind::Expense)).await;
    engine.set_account_active("alice", closed, false).await.unwrap();

    engine
        .record_expense(ExpenseCmd::new("alice", food, eur_wallet, 2_500, day(4)))
        .await
        .unwrap();

    let balances = engine.wallet_balances("alice").await.unwrap();
    let ids: Vec<Uuid> = balances.iter().map(|b| b.account_id).collect();
    assert_eq!(ids, vec![eur_wallet, usd_wallet, yen_wallet]);

    assert_eq!(balances[0].balance_minor, 7_500);
    assert_eq!(balances[0].converted_minor, Some(7_500));
    assert_eq!(balances[0].rate, Some(1.0));

    assert_eq!(balances[1].currency, Currency::USD);
    assert_eq!(balances[1].balance_minor, 500);
    assert_eq!(balances[1].converted_minor, Some(450));
    assert_eq!(balances[1].base_currency, Currency::EUR);

    assert_eq!(balances[2].balance_minor, 3_000);
    assert_eq!(balances[2].converted_minor, None);
    assert_eq!(balances[2].rate, None);
}

#[tokio::test]
async fn base_currency_can_be_changed() {
    let (engine, _db) = engine_with_db().await;
    assert_eq!(engine.base_currency("alice").await.unwrap(), Currency::EUR);
    engine
        .set_base_currency("alice", Currency::USD)
        .await
        .unwrap();
    assert_eq!(engine.base_currency("alice").await.unwrap(), Currency::USD);
    assert_eq!(
        engine.base_currency("mallory").await.unwrap_err(),
        EngineError::Unauthorized
    );
}
