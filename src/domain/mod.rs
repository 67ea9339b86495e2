pub mod id_allocator;
pub mod models;
pub mod undo;
