//! Fatal diagnostics for internal invariant violations.
//!
//! A violation here means that either this compiler has a bug or that the
//! MidIR handed to it was malformed. Neither case is recoverable, so the
//! macros format a diagnostic and abort the current compilation by panicking.

/// Expands to the short name of the enclosing function.
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

macro_rules! internal_error {
    ($($arg:tt)*) => {{
        let message = format!(
            "{}: {}",
            colored::Colorize::red("internal error"),
            format!($($arg)*)
        );

        #[cfg(feature = "error-backtrace")]
        let message = format!(
            "{}: {}\n{}",
            colored::Colorize::blue("backtrace"),
            format!(
                "{}::{} {}",
                module_path!(),
                function!(),
                colored::Colorize::white(
                    format!("(at {}:{}:{})", file!(), line!(), column!()).as_str()
                )
            ),
            message
        );

        panic!("{message}")
    }};
}
