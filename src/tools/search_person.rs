use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchPersonParams {
    #[schemars(
        description = "Person name, matched case-insensitively as a substring of sender names"
    )]
    pub person: String,

    #[schemars(description = "Session id for budget tracking. Defaults to 'default'.")]
    pub session: Option<String>,
}
