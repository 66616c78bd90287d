mod http;
mod lifecycle;
mod router;
mod store;
mod worker;

pub use http::{HttpNetwork, Network, Request, Response};
pub use lifecycle::WorkerState;
pub use store::{MemoryResponseStore, ResponseStore, SqliteResponseStore};
pub use worker::ServiceWorker;
