//! Result shapes shared by every runner and the in-order fan-in fold.

/// Outcome of a single attempt on a single input.
pub type AttemptResult<O, E = anyhow::Error> = Result<O, E>;

/// Outcome of a whole `map*` call: every output in input order, or one error.
pub type AggregateResult<O, E = anyhow::Error> = Result<Vec<O>, E>;

/// Folds per-unit results into an aggregate by walking them in input order.
///
/// The first `Err` encountered wins, so the aggregate always carries the error of
/// the lowest-index failing unit no matter when that unit finished. Results after
/// it are dropped.
pub fn collect_in_order<O, E, R>(results: R) -> AggregateResult<O, E>
where
    R: IntoIterator<Item = AttemptResult<O, E>>,
{
    let results = results.into_iter();
    let mut outputs = Vec::with_capacity(results.size_hint().0);

    for (index, result) in results.enumerate() {
        match result {
            Ok(output) => outputs.push(output),
            Err(err) => {
                tracing::debug!(unit = index, "unit failed; aggregate reports its error");
                return Err(err);
            }
        }
    }

    Ok(outputs)
}
