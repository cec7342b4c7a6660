/// CSV and JSON writers for run outputs.
pub mod export;
