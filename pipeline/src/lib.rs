pub mod bridge;
pub mod configurer;
pub mod gate;
pub mod lifecycle;
pub mod media;
pub mod stage;
pub mod synthetic;

#[cfg(test)]
mod testing;
