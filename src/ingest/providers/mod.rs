pub mod eurlex;
