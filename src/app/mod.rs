pub mod ports;
pub mod batch_use_case;
pub mod stream_use_case;
