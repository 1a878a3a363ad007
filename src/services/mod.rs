pub mod assistant;
pub mod export;
pub mod hint;
pub mod llm;
