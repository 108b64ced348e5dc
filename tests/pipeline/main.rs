mod budget;
mod decisions;
mod support;
