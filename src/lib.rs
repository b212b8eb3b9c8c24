//! HTTP gateway that turns document images into markdown with a
//! vision-language OCR model.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod idle;
pub mod inference;
pub mod state;
pub mod telemetry;

pub use crate::config::Config;
pub use crate::error::{GatewayError, GatewayResult, HttpErrorResponse, ScanError};
pub use crate::inference::engine::{
    CompletionOutput, ModelLoader, OcrEngine, PromptInput, RequestOutput,
};
pub use crate::inference::generation_config::GenerationConfig;
pub use crate::inference::holder::{LoadedModel, ModelHolder, ModelState};
pub use crate::state::AppState;
