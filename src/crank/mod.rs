pub mod executor;
pub mod resolver;
pub mod runner;
pub mod selector;

#[cfg(test)]
pub(crate) mod testutil;
