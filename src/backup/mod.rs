pub mod archive;
pub mod archiver;
pub mod coordinator;
pub mod dir_ops;
pub mod extractor;
pub mod result_error;
pub mod storage;
pub mod store;
pub mod swap;
pub mod validate;
pub mod worker;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
