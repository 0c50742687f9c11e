pub mod archive;
pub mod borg_config;
pub mod cli;
pub mod existence;
pub mod lock;
pub mod log_line;
pub mod operation;
pub mod redacted;
pub mod repository;
pub mod restoration;
pub mod result_error;
#[cfg(test)]
pub(crate) mod testing;
pub mod validate;
pub mod version;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
