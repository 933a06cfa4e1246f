pub mod dispatcher;
pub mod http;
pub mod mock;
pub mod pool;
pub mod traits;
pub mod worker;

pub use dispatcher::{
    DispatcherStats, EmbeddingDispatcher, EmbeddingRequest, EmbeddingResponse, ModelError,
    ModelResult,
};
pub use http::HttpEmbeddingProvider;
pub use mock::MockProvider;
pub use pool::EmbeddingPool;
pub use traits::EmbeddingProvider;
pub use worker::{EmbeddingBatch, EmbeddingWorker};
