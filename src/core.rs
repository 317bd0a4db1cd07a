pub mod allocator;
pub mod comparison;
pub mod fragmentation;
pub mod timeline;
