pub mod openai;
pub mod shapes;
pub mod transcript;
