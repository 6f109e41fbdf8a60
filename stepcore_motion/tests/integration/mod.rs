mod common;
mod compressor_properties;
mod pipeline;
mod solver_properties;
