//! The demo function exposed to the model: a dummy news lookup

use chatloop_client::FunctionDeclaration;
use chatloop_driver::FunctionRegistry;
use serde::Deserialize;

pub const SUNNY: &str = "Tomorrow's weather will be sunny.";
pub const RAINY: &str = "Tomorrow's weather will be rainy.";

#[derive(Debug, Deserialize)]
pub struct NewsParams {
    /// Random seed, 0 to 100
    pub seed: f64,
}

pub fn declaration() -> FunctionDeclaration {
    FunctionDeclaration::new("get_news", "Get news from the news API").with_parameters(
        serde_json::json!({
            "type": "object",
            "properties": {
                "seed": {
                    "type": "number",
                    "description": "random seed. from 0 to 100"
                }
            },
            "required": ["seed"]
        }),
    )
}

pub fn get_news(params: &NewsParams) -> &'static str {
    if params.seed < 50.0 {
        SUNNY
    } else {
        RAINY
    }
}

pub fn registry() -> FunctionRegistry {
    FunctionRegistry::new().register_typed(declaration(), |params: NewsParams| async move {
        Ok(get_news(&params).to_string())
    })
}
