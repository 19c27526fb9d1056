mod append;
mod compat;
mod flatten;
mod metadata;
mod names;
mod platform;
