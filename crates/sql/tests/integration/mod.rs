mod mapping;
mod statements;
