mod request;
mod response;
mod stream;

pub use request::adapt_chat_request;
pub use response::adapt_chat_response;
pub use stream::AnthropicStreamAdapter;
