use std::{
    collections::BTreeMap,
    sync::{Mutex, OnceLock},
};

static METRICS: OnceLock<Mutex<MetricsState>> = OnceLock::new();

#[derive(Default)]
struct MetricsState {
    total: u64,
    errors: u64,
    per_operation: BTreeMap<&'static str, u64>,
    per_operation_err: BTreeMap<&'static str, u64>,
    // 业务拒绝按错误种类统计
    rejections: BTreeMap<&'static str, u64>,
    transferred_amount: u128,
    replenished_amount: u128,
    code_collisions: u64,
    degraded_histories: u64,
}

fn state() -> &'static Mutex<MetricsState> {
    METRICS.get_or_init(|| Mutex::new(MetricsState::default()))
}

fn lock() -> std::sync::MutexGuard<'static, MetricsState> {
    match state().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub fn count_ok(operation: &'static str) {
    let mut s = lock();
    s.total += 1;
    *s.per_operation.entry(operation).or_insert(0) += 1;
}

pub fn count_err(operation: &'static str, kind: &'static str) {
    let mut s = lock();
    s.total += 1;
    s.errors += 1;
    *s.per_operation.entry(operation).or_insert(0) += 1;
    *s.per_operation_err.entry(operation).or_insert(0) += 1;
    *s.rejections.entry(kind).or_insert(0) += 1;
}

pub fn add_transferred(amount: i64) {
    lock().transferred_amount += amount.unsigned_abs() as u128;
}

pub fn add_replenished(amount: i64) {
    lock().replenished_amount += amount.unsigned_abs() as u128;
}

pub fn count_code_collision() {
    lock().code_collisions += 1;
}

pub fn count_degraded_history() {
    lock().degraded_histories += 1;
}

pub fn render_prometheus() -> String {
    let s = lock();
    let mut out = String::new();
    out.push_str("# HELP walletledger_operations_total Total ledger operations\n");
    out.push_str("# TYPE walletledger_operations_total counter\n");
    out.push_str(&format!("walletledger_operations_total {}\n", s.total));

    out.push_str("# HELP walletledger_errors_total Total failed ledger operations\n");
    out.push_str("# TYPE walletledger_errors_total counter\n");
    out.push_str(&format!("walletledger_errors_total {}\n", s.errors));

    out.push_str("# HELP walletledger_operation_total Ledger operations by name\n");
    out.push_str("# TYPE walletledger_operation_total counter\n");
    for (op, v) in s.per_operation.iter() {
        out.push_str(&format!(
            "walletledger_operation_total{{operation=\"{}\"}} {}\n",
            op, v
        ));
    }

    out.push_str("# HELP walletledger_operation_errors_total Failed ledger operations by name\n");
    out.push_str("# TYPE walletledger_operation_errors_total counter\n");
    for (op, v) in s.per_operation_err.iter() {
        out.push_str(&format!(
            "walletledger_operation_errors_total{{operation=\"{}\"}} {}\n",
            op, v
        ));
    }

    out.push_str("# HELP walletledger_errors_by_kind_total Failed operations by error kind\n");
    out.push_str("# TYPE walletledger_errors_by_kind_total counter\n");
    for (kind, v) in s.rejections.iter() {
        out.push_str(&format!(
            "walletledger_errors_by_kind_total{{kind=\"{}\"}} {}\n",
            kind, v
        ));
    }

    out.push_str("# HELP walletledger_transferred_amount_total Sum of committed transfer amounts\n");
    out.push_str("# TYPE walletledger_transferred_amount_total counter\n");
    out.push_str(&format!(
        "walletledger_transferred_amount_total {}\n",
        s.transferred_amount
    ));

    out.push_str("# HELP walletledger_replenished_amount_total Sum of committed replenishments\n");
    out.push_str("# TYPE walletledger_replenished_amount_total counter\n");
    out.push_str(&format!(
        "walletledger_replenished_amount_total {}\n",
        s.replenished_amount
    ));

    out.push_str("# HELP walletledger_code_collisions_total Wallet code collisions retried\n");
    out.push_str("# TYPE walletledger_code_collisions_total counter\n");
    out.push_str(&format!(
        "walletledger_code_collisions_total {}\n",
        s.code_collisions
    ));

    out.push_str("# HELP walletledger_degraded_histories_total Histories degraded to empty\n");
    out.push_str("# TYPE walletledger_degraded_histories_total counter\n");
    out.push_str(&format!(
        "walletledger_degraded_histories_total {}\n",
        s.degraded_histories
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_operation_labels() {
        count_ok("metrics_test_op");
        count_err("metrics_test_op", "invalid_amount");
        let text = render_prometheus();
        assert!(text.contains("walletledger_operation_total{operation=\"metrics_test_op\"}"));
        assert!(text.contains("walletledger_errors_by_kind_total{kind=\"invalid_amount\"}"));
    }
}
