#[macro_use]
mod fixtures;
mod integration;
