mod predict;
mod request;
mod response;
mod schema;
mod stream;

pub use predict::{
    adapt_embeddings_request, adapt_embeddings_response, adapt_image_request,
    adapt_image_response,
};
pub use request::adapt_chat_request;
pub use response::adapt_chat_response;
pub use schema::sanitize_schema;
pub use stream::VertexStreamAdapter;
