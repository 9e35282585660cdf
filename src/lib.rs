pub mod api_client;
pub mod config;
pub mod form;
pub mod http_client;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod shutdown;
pub mod snapshot;
pub mod store;
pub mod transform;
