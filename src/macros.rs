macro_rules! fn_name_bare {
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

macro_rules! fn_name {
    () => {{
        format!("{}()", $crate::macros::fn_name_bare!())
    }};
}

/// logs the duration of the enclosing scope at debug level if it exceeds a
/// threshold in seconds. The default threshold is read from the
/// `LOG_SLOW_SCOPE_THRESHOLD` environment variable.
macro_rules! log_slow_scope {
    () => {
        let log_slow_scope_desc = $crate::macros::fn_name!();
        let _____x = $crate::ScopeDurationLogger::new_default_threshold(&log_slow_scope_desc);
    };
    ($description: expr) => {
        let log_slow_scope_desc = $description;
        let _____x = $crate::ScopeDurationLogger::new_default_threshold(&log_slow_scope_desc);
    };
    ($description: expr, $threshold: expr) => {
        let log_slow_scope_desc = $description;
        let _____x =
            $crate::ScopeDurationLogger::new_with_threshold(&log_slow_scope_desc, $threshold);
    };
}

/// logs the duration of the enclosing scope at debug level.
macro_rules! log_scope_duration {
    () => {
        let log_scope_desc = $crate::macros::fn_name!();
        let _____x = $crate::ScopeDurationLogger::new_without_threshold(&log_scope_desc);
    };
    ($description: expr) => {
        let log_scope_desc = $description;
        let _____x = $crate::ScopeDurationLogger::new_without_threshold(&log_scope_desc);
    };
}

// These allow the macros to be used as
// use crate::macros::xxxxx;
//
// see: https://stackoverflow.com/a/67140319/10087197

#[allow(unused_imports)]
pub(crate) use fn_name;
#[allow(unused_imports)]
pub(crate) use fn_name_bare;
#[allow(unused_imports)]
pub(crate) use log_scope_duration;
#[allow(unused_imports)]
pub(crate) use log_slow_scope;

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn fn_name_test() {
        assert_eq!(fn_name!(), "fn_name_test()");
    }

    #[tokio::test]
    async fn async_fn_name_test() {
        assert_eq!(fn_name!(), "async_fn_name_test()");
    }

    #[test]
    #[tracing_test::traced_test]
    fn log_scope_duration_test() {
        {
            log_scope_duration!(fn_name!());
        }
        assert!(logs_contain("executed log_scope_duration_test()"));
    }

    #[test]
    #[tracing_test::traced_test]
    fn log_slow_scope_below_threshold_is_silent() {
        {
            log_slow_scope!(fn_name!(), 3600.0);
        }
        assert!(!logs_contain("exceeds slow scope threshold"));
    }
}
