pub mod engine;
pub mod mapping;
pub mod paths;
pub mod source;
#[cfg(test)]
mod testing;
pub mod timestamp;
pub mod tree;
