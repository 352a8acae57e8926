pub mod catraca;
pub mod cli;
