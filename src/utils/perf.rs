/// Time one pipeline stage of a work item. Stages that overrun `$budget_ms`
/// are reported at warn level, the rest at trace.
///
/// Expands to the bare block unless `LOG_PERFORMANCE` is on.
#[macro_export]
macro_rules! trace_time {
    ($stage:expr, $item:expr, $budget_ms:expr, $block:block) => {{
        if $crate::config::LOG_PERFORMANCE {
            let started = $crate::utils::AppInstant::now();
            let value = $block;
            let spent = started.elapsed();
            let budget = std::time::Duration::from_millis($budget_ms);
            if spent > budget {
                log::warn!(
                    "{}@{} {} took {:?} (budget {:?})",
                    $item.symbol,
                    $item.offset,
                    $stage,
                    spent,
                    budget
                );
            } else {
                log::trace!("{}@{} {} took {:?}", $item.symbol, $item.offset, $stage, spent);
            }
            value
        } else {
            $block
        }
    }};
}
