use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EndSessionParams {
    #[schemars(description = "Session id to end. Defaults to 'default'.")]
    pub session: Option<String>,
}
