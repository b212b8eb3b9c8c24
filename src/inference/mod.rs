pub mod engine;
pub mod generation_config;
pub mod holder;
pub mod hub;
pub mod ocr;
pub mod process;
pub mod vllm;
