use pretty_assertions::assert_eq;

use tablestream::{AccumulationMode, Code, Duration, ExecuteOptions, TriggerSpec, WindowSpec};

#[test]
fn empty_object_yields_defaults() {
    let options = ExecuteOptions::from_json_str("{}").unwrap();
    assert_eq!(options, ExecuteOptions::default());
    assert_eq!(options.fan_in_queue_depth, 64);
    assert_eq!(
        options.trigger,
        TriggerSpec::AfterWatermark {
            allowed_lateness: Duration::ZERO
        }
    );
}

#[test]
fn nested_triggers_load_from_json() {
    let options = ExecuteOptions::from_json_str(
        r#"{
            "accumulation_mode": "discarding",
            "fan_in_queue_depth": 8,
            "trigger": {
                "kind": "or_finally",
                "main": {"kind": "repeated", "trigger": {"kind": "after_processing_time", "duration": "10s"}},
                "finally": {"kind": "after_watermark", "allowed_lateness": "1m"}
            }
        }"#,
    )
    .unwrap();
    assert_eq!(options.accumulation_mode, AccumulationMode::Discarding);
    assert_eq!(options.fan_in_queue_depth, 8);
    assert_eq!(
        options.trigger,
        TriggerSpec::OrFinally {
            main: Box::new(TriggerSpec::Repeated {
                trigger: Box::new(TriggerSpec::AfterProcessingTime {
                    duration: Duration::from_secs(10)
                }),
            }),
            finally: Box::new(TriggerSpec::AfterWatermark {
                allowed_lateness: Duration::from_minutes(1)
            }),
        }
    );
}

#[test]
fn malformed_options_are_invalid() {
    let err = ExecuteOptions::from_json_str(r#"{"trigger": {"kind": "after_processing_time", "duration": "10 parsecs"}}"#)
        .unwrap_err();
    assert_eq!(err.code(), Code::Invalid);

    let err = ExecuteOptions::from_json_str(r#"{"accumulation_mode": "sometimes"}"#).unwrap_err();
    assert_eq!(err.code(), Code::Invalid);
}

#[test]
fn window_spec_round_trips_through_json() {
    let spec = WindowSpec {
        every: Duration::from_months(1),
        period: Some(Duration::from_months(1)),
        offset: Duration::from_days(-1),
        create_empty: true,
        ..WindowSpec::default()
    };
    let json = serde_json::to_string(&spec).unwrap();
    assert!(json.contains(r#""every":"1mo""#), "{json}");
    assert!(json.contains(r#""offset":"-1d""#), "{json}");
    let back: WindowSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(back, spec);
    assert!(back.window().is_ok());
}

#[test]
fn invalid_window_intervals_are_rejected() {
    for every in ["0s", "-1m", "1mo1d"] {
        let spec = WindowSpec::new(every.parse().unwrap());
        let err = spec.window().unwrap_err();
        assert_eq!(err.code(), Code::Invalid, "{every}");
    }
}
