use sea_orm::sea_query::{Alias, Expr, Func, IntoColumnRef, SimpleExpr};

/// `CAST(COALESCE(SUM(col), 0) AS bigint)`
///
/// Postgres 对 bigint 求和得到 numeric，这里统一转回 bigint，空集返回 0。
pub fn sum_as_bigint<C: IntoColumnRef>(col: C) -> SimpleExpr {
    Func::cast_as(
        Func::coalesce([Expr::col(col).sum(), Expr::val(0i64).into()]),
        Alias::new("bigint"),
    )
    .into()
}
