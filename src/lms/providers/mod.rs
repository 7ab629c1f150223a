// src/lms/providers/mod.rs
pub mod canvas;
