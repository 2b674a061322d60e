pub mod parser;
pub mod table;
