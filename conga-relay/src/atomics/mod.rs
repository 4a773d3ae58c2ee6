pub mod atomic_counter;

pub use atomic_counter::AtomicCounterWriter;
