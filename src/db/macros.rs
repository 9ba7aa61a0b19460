//! Database dispatch macros for reducing code duplication.
//!
//! The pool, pooled connection and transaction wrappers are all enums with
//! one variant per backend. These macros expand a single body into one
//! match arm per variant, with the matching executor module in scope.

/// Macro for generating database dispatch match arms.
///
/// Expands `$body` once per backend variant of `$enum`. Inside the body,
/// `$inner` is the variant payload and `$backend` names the executor module
/// for that backend (`db::executor::{mysql, postgres, sqlite}`).
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(PooledConnection, &mut conn, |c, backend| {
///     backend::execute_scalar(&mut **c, &statement, timeout).await
/// })
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($enum:ident, $value:expr, |$inner:ident, $backend:ident| $body:expr) => {
        match $value {
            $enum::MySql($inner) => {
                #[allow(unused_imports)]
                use $crate::db::executor::mysql as $backend;
                $body
            }
            $enum::Postgres($inner) => {
                #[allow(unused_imports)]
                use $crate::db::executor::postgres as $backend;
                $body
            }
            $enum::SQLite($inner) => {
                #[allow(unused_imports)]
                use $crate::db::executor::sqlite as $backend;
                $body
            }
        }
    };
}

pub use impl_db_dispatch;

#[cfg(test)]
mod tests {
    enum Backend {
        MySql(u8),
        Postgres(u8),
        SQLite(u8),
    }

    fn describe(value: &Backend) -> String {
        impl_db_dispatch!(Backend, value, |n, backend| {
            format!("{}:{}", backend::NAME, n)
        })
    }

    #[test]
    fn test_dispatch_selects_backend_module() {
        assert_eq!(describe(&Backend::MySql(1)), "mysql:1");
        assert_eq!(describe(&Backend::Postgres(2)), "postgres:2");
        assert_eq!(describe(&Backend::SQLite(3)), "sqlite:3");
    }
}
