pub mod align;
pub mod canvas;
pub mod consts;
pub mod downsample;
pub mod error;
pub mod fft;
pub mod frame;
pub mod grayscale;
pub mod io;
pub mod pipeline;
pub mod report;
pub mod set;
