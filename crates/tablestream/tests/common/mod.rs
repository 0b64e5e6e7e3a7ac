#![allow(dead_code)]

use tablestream::{
    Bounds, BufferedTable, ColMeta, ColType, Dataset, DatasetId, Duration, ExecuteOptions,
    ExecutionContext, FixedWindowTransformation, GroupKey, ResultCollector, Table, TableBuilder,
    Time, Value, WindowSpec,
};

/// 2024-01-01T00:00:00Z.
pub fn t0() -> Time {
    Time::parse_rfc3339("2024-01-01T00:00:00Z").unwrap()
}

pub fn at(offset: &str) -> Time {
    t0().add(offset.parse::<Duration>().unwrap())
}

pub fn host_key(host: &str) -> GroupKey {
    GroupKey::new(vec![ColMeta::new("host", ColType::String)], vec![Value::from(host)])
}

/// A `host`/`_time`/`_value` table keyed by host.
pub fn points(host: &str, rows: &[(Time, f64)]) -> Box<dyn Table> {
    let mut b = TableBuilder::new(host_key(host));
    b.add_col(ColMeta::new("host", ColType::String)).unwrap();
    b.add_col(ColMeta::new("_time", ColType::Time)).unwrap();
    b.add_col(ColMeta::new("_value", ColType::Float)).unwrap();
    for &(t, v) in rows {
        b.append_string(0, host).unwrap();
        b.append_time(1, t).unwrap();
        b.append_float(2, v).unwrap();
    }
    Box::new(b.table().unwrap())
}

pub fn sink_dataset(ctx: &ExecutionContext, node: &str) -> (Dataset, ResultCollector) {
    let mut d = Dataset::new(DatasetId::from_node_id(node), ctx);
    let sink = ResultCollector::new();
    d.add_transformation(Box::new(sink.clone()));
    (d, sink)
}

pub fn window_spec(every: &str, period: &str, offset: &str) -> WindowSpec {
    WindowSpec {
        every: every.parse().unwrap(),
        period: Some(period.parse().unwrap()),
        offset: offset.parse().unwrap(),
        ..WindowSpec::default()
    }
}

pub fn window_chain(
    spec: WindowSpec,
    bounds: Bounds,
) -> (FixedWindowTransformation, ResultCollector) {
    let ctx = ExecutionContext::new(ExecuteOptions::default()).with_bounds(bounds);
    let (d, sink) = sink_dataset(&ctx, "window");
    (FixedWindowTransformation::new(&spec, ctx.bounds, d).unwrap(), sink)
}

/// The `_start`/`_stop` key values of each table.
pub fn window_bounds(tables: &[BufferedTable]) -> Vec<Bounds> {
    tables
        .iter()
        .map(|t| {
            let key = t.key();
            let start = key.label_value("_start").and_then(Value::as_time).unwrap();
            let stop = key.label_value("_stop").and_then(Value::as_time).unwrap();
            Bounds::new(start, stop)
        })
        .collect()
}
