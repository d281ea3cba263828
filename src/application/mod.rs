//! Application services: the fetch coordinator, the plugin chain and the
//! request pipeline composing them.

pub mod context;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod plugins;
pub mod repos;

#[cfg(test)]
pub(crate) mod testing;
