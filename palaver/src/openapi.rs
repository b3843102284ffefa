//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::api::models::chat::{ChatError, ChatRequestBody, ChatResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "palaver",
        description = "Chat relay for hosted assistant services. Forwards messages and file \
                       uploads to the configured assistant, polls the resulting run to \
                       completion, and returns either the reply text or a generated file."
    ),
    paths(crate::api::handlers::chat::relay_chat),
    components(schemas(ChatRequestBody, ChatResponse, ChatError)),
    tags((name = "chat", description = "Message and upload relay"))
)]
pub struct ApiDoc;
