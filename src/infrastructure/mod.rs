pub mod connectors;
pub mod llm_classifier;
pub mod synthesizer;
pub mod vector_backend;
