// shared fakes and harness glue for core-level and end-to-end tests

pub mod port_fakes;
pub mod support;
