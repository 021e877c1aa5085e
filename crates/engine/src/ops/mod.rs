use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    AttachmentStore, ConversionBatcher, ExchangeRateCache, NoopAttachmentStore, ResultEngine,
    Settings,
};

mod access;
mod accounts;
mod reconciliation;
mod transactions;
mod users;

pub use transactions::TransactionListFilter;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    converter: Arc<ConversionBatcher>,
    attachments: Arc<dyn AttachmentStore>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Batcher used for every cross-currency valuation.
    pub fn converter(&self) -> &ConversionBatcher {
        &self.converter
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    converter: Option<Arc<ConversionBatcher>>,
    attachments: Option<Arc<dyn AttachmentStore>>,
    settings: Option<Settings>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Use an existing batcher instead of building one from the settings
    pub fn converter(mut self, converter: Arc<ConversionBatcher>) -> EngineBuilder {
        self.converter = Some(converter);
        self
    }

    /// External file store released when transactions are deleted
    pub fn attachments(mut self, store: Arc<dyn AttachmentStore>) -> EngineBuilder {
        self.attachments = Some(store);
        self
    }

    /// Settings for the default rate providers (defaults if not passed)
    pub fn settings(mut self, settings: Settings) -> EngineBuilder {
        self.settings = Some(settings);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let converter = match self.converter {
            Some(converter) => converter,
            None => {
                let settings = self.settings.unwrap_or_default();
                let cache =
                    ExchangeRateCache::from_settings(self.database.clone(), &settings.rates)?;
                Arc::new(ConversionBatcher::new(Arc::new(cache)))
            }
        };
        Ok(Engine {
            database: self.database,
            converter,
            attachments: self
                .attachments
                .unwrap_or_else(|| Arc::new(NoopAttachmentStore)),
        })
    }
}
