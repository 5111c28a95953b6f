//! Utility modules for wendeploy

pub mod http;
pub mod prompt;
pub mod stream;

// Re-export commonly used items
pub use http::HttpClient;
pub use prompt::confirm;
pub use stream::copy_chunked;
