use serde::Serialize;

/// Decoding parameters applied uniformly to every OCR generation.
#[derive(Serialize, Debug, Copy, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_tokens: usize,
    pub skip_special_tokens: bool,
}

impl GenerationConfig {
    pub const OCR: GenerationConfig = GenerationConfig {
        temperature: 0.1,
        max_tokens: 4096,
        skip_special_tokens: true,
    };
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::OCR
    }
}
