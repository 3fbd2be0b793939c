pub mod ast;
pub mod callable;
pub mod class;
pub mod environment;
pub mod instance;
pub mod interpreter;
pub mod parser;
pub mod scanner;
pub mod token;
