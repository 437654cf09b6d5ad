pub mod reader;
pub mod writer;

#[cfg(test)]
mod tests;
