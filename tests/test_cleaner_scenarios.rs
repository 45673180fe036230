mod common;

use approx::assert_abs_diff_eq;
use common::{clean_trips, clean_trips_with, number, write_raw, CleanedFile, RawTrip};
use trip_cleaner::dataset::OUTPUT_COLUMNS;
use trip_cleaner::settings::{FareSchedule, PlausibilityBounds};
use trip_cleaner::transformers::kinematics::{haversine_km, EARTH_RADIUS_KM};
use trip_cleaner::{
    AuditEvent, CleaningConfig, ExclusionLog, ExclusionReason, TripCleaner, TripCleanerError,
};

#[tokio::test]
async fn test_valid_trip_is_enriched() {
    let run = clean_trips(&[RawTrip::valid("t1")]).await;
    assert_eq!(run.report.final_rows, 1);

    let row = run.cleaned.row("t1").expect("trip t1 should survive");
    assert_eq!(row["pickup_zone"], "midtown");
    assert_eq!(row["dropoff_zone"], "downtown");
    assert_abs_diff_eq!(number(row, "trip_duration_seconds"), 900.0);
    assert_abs_diff_eq!(number(row, "trip_duration_minutes"), 15.0);
    assert_eq!(row["is_pickup_peak_hour"], "1");
    assert_eq!(row["time_of_day"], "Morning");
    assert_eq!(row["store_and_fwd_flag"], "N");
    assert_eq!(row["pickup_datetime"], "2016-01-01 08:00:00");
    assert_eq!(row["dropoff_datetime"], "2016-01-01 08:15:00");

    // 2016-01-01 was a Friday.
    assert_eq!(row["pickup_date"], "2016-01-01");
    assert_eq!(row["pickup_month"], "1");
    assert_eq!(row["pickup_hour"], "8");
    assert_eq!(row["pickup_day_of_week"], "4");
    assert_eq!(row["pickup_day_name"], "Friday");
    assert_eq!(row["is_pickup_weekend"], "0");

    let distance = number(row, "trip_distance_km");
    let expected = haversine_km(-73.98, 40.75, -73.99, 40.73, EARTH_RADIUS_KM);
    assert_abs_diff_eq!(distance, expected, epsilon = 1e-9);
    let speed = number(row, "trip_speed_kmh");
    assert!(speed > 0.0 && speed <= 120.0);
    assert_abs_diff_eq!(speed, distance / 900.0 * 3600.0, epsilon = 1e-9);
    assert_abs_diff_eq!(
        number(row, "estimated_fare"),
        2.5 + distance * 2.5 + 15.0 * 0.5,
        epsilon = 1e-9
    );
    assert_abs_diff_eq!(
        number(row, "fare_per_km"),
        number(row, "estimated_fare") / distance,
        epsilon = 1e-9
    );
    assert_abs_diff_eq!(number(row, "idle_time_ratio"), 0.0, epsilon = 1e-9);
}

#[tokio::test]
async fn test_zero_passengers_are_excluded() {
    let mut empty = RawTrip::valid("empty");
    empty.passenger_count = "0".to_string();
    let run = clean_trips(&[RawTrip::valid("t1"), empty]).await;

    assert_eq!(run.cleaned.ids(), vec!["t1"]);
    assert_eq!(
        run.log.reasons_for("empty"),
        vec![&ExclusionReason::InvalidPassengerCount(0)]
    );
    assert!(run
        .log
        .lines()
        .iter()
        .any(|line| line.contains("Excluded trip empty - invalid passenger count 0")));
}

#[tokio::test]
async fn test_out_of_region_trip_is_dropped_before_derivation() {
    let mut north = RawTrip::valid("north");
    north.pickup = (-73.98, 42.0);
    let run = clean_trips(&[RawTrip::valid("t1"), north]).await;

    assert!(run.cleaned.row("north").is_none());
    assert_eq!(
        run.log.reasons_for("north"),
        vec![&ExclusionReason::InvalidCoordinates]
    );
    let excluded_at: Vec<&str> = run
        .log
        .events()
        .filter_map(|event| match event {
            AuditEvent::Excluded { id, stage, .. } if id == "north" => Some(stage.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(excluded_at, vec!["geographic validator"]);

    let geo = &run.report.removed_per_stage[2];
    assert_eq!(geo.stage, "geographic validator");
    assert_eq!(geo.removed(), 1);
}

#[tokio::test]
async fn test_duplicates_are_collapsed() {
    let run = clean_trips(&[
        RawTrip::valid("t1"),
        RawTrip::valid("t2"),
        RawTrip::valid("t1"),
    ])
    .await;

    assert_eq!(run.cleaned.ids(), vec!["t1", "t2"]);
    assert_eq!(run.log.duplicates_dropped(), 1);
    assert_eq!(run.report.initial_rows, 3);
    assert_eq!(run.report.removed_per_stage[0].removed(), 1);
}

#[tokio::test]
async fn test_every_violated_bound_is_excluded() {
    let mut fast = RawTrip::valid("fast");
    fast.pickup = (-74.40, 40.55);
    fast.dropoff = (-73.60, 40.95);
    fast.dropoff_datetime = "2016-01-01 08:10:00".to_string();

    let mut instant = RawTrip::valid("instant");
    instant.dropoff_datetime = instant.pickup_datetime.clone();

    let mut backwards = RawTrip::valid("backwards");
    backwards.dropoff_datetime = "2016-01-01 07:50:00".to_string();

    let mut stationary = RawTrip::valid("stationary");
    stationary.dropoff = stationary.pickup;

    let mut crowded = RawTrip::valid("crowded");
    crowded.passenger_count = "10".to_string();

    let mut west = RawTrip::valid("west");
    west.dropoff = (-74.6, 40.73);

    let run = clean_trips(&[
        RawTrip::valid("ok"),
        fast,
        instant,
        backwards,
        stationary,
        crowded,
        west,
    ])
    .await;

    assert_eq!(run.cleaned.ids(), vec!["ok"]);

    let fast_reasons = run.log.reasons_for("fast");
    assert_eq!(fast_reasons.len(), 1);
    assert!(matches!(fast_reasons[0], ExclusionReason::InvalidSpeed(speed) if *speed > 120.0));

    let instant_reasons = run.log.reasons_for("instant");
    assert!(instant_reasons.contains(&&ExclusionReason::InvalidDuration));
    assert!(instant_reasons.contains(&&ExclusionReason::InvalidSpeed(0.0)));

    assert!(run
        .log
        .reasons_for("backwards")
        .contains(&&ExclusionReason::InvalidDuration));
    assert!(run
        .log
        .reasons_for("stationary")
        .contains(&&ExclusionReason::InvalidDistance));
    assert_eq!(
        run.log.reasons_for("crowded"),
        vec![&ExclusionReason::InvalidPassengerCount(10)]
    );
    assert_eq!(
        run.log.reasons_for("west"),
        vec![&ExclusionReason::InvalidCoordinates]
    );

    let plausibility = run.report.removed_per_stage.last().unwrap();
    assert_eq!(plausibility.stage, "plausibility filter");
    assert_eq!(plausibility.removed(), 5);
}

#[tokio::test]
async fn test_output_rows_satisfy_invariants() {
    let mut flagged = RawTrip::valid("flagged");
    flagged.store_and_fwd_flag = "1".to_string();

    let mut overlap = RawTrip::valid("overlap");
    overlap.pickup = (-73.93, 40.69);
    overlap.dropoff = (-73.88, 40.85);

    let mut unzoned = RawTrip::valid("unzoned");
    unzoned.pickup = (-74.40, 40.55);
    unzoned.dropoff = (-74.38, 40.56);
    unzoned.pickup_datetime = "2016-01-03 22:30:00".to_string();
    unzoned.dropoff_datetime = "2016-01-03 22:45:00".to_string();

    let run = clean_trips(&[RawTrip::valid("t1"), flagged, overlap, unzoned]).await;
    assert_eq!(run.report.final_rows, 4);

    let zones = [
        "", "midtown", "downtown", "uptown", "brooklyn", "queens", "bronx",
    ];
    for row in &run.cleaned.rows {
        let passengers = number(row, "passenger_count");
        assert!(passengers > 0.0 && passengers <= 9.0);
        for column in ["pickup_latitude", "dropoff_latitude"] {
            assert!((40.5..=41.0).contains(&number(row, column)));
        }
        for column in ["pickup_longitude", "dropoff_longitude"] {
            assert!((-74.5..=-73.5).contains(&number(row, column)));
        }
        assert!(number(row, "trip_distance_km") > 0.0);
        assert!(number(row, "trip_duration_seconds") > 0.0);
        let speed = number(row, "trip_speed_kmh");
        assert!(speed > 0.0 && speed <= 120.0);
        for column in ["trip_speed_kmh", "fare_per_km", "idle_time_ratio", "estimated_fare"] {
            assert!(number(row, column).is_finite());
        }
        assert!((0.0..=1.0).contains(&number(row, "idle_time_ratio")));
        assert!(["Y", "N"].contains(&row["store_and_fwd_flag"].as_str()));
        assert!(["Morning", "Afternoon", "Evening", "Night"].contains(&row["time_of_day"].as_str()));
        assert!(zones.contains(&row["pickup_zone"].as_str()));
        assert!(zones.contains(&row["dropoff_zone"].as_str()));
    }

    assert_eq!(run.cleaned.row("flagged").unwrap()["store_and_fwd_flag"], "Y");

    let overlap = run.cleaned.row("overlap").unwrap();
    assert_eq!(overlap["pickup_zone"], "brooklyn");
    assert_eq!(overlap["dropoff_zone"], "bronx");

    // 2016-01-03 was a Sunday.
    let unzoned = run.cleaned.row("unzoned").unwrap();
    assert_eq!(unzoned["pickup_zone"], "");
    assert_eq!(unzoned["dropoff_zone"], "");
    assert_eq!(unzoned["pickup_day_of_week"], "6");
    assert_eq!(unzoned["is_pickup_weekend"], "1");
    assert_eq!(unzoned["is_pickup_peak_hour"], "0");
    assert_eq!(unzoned["time_of_day"], "Night");
}

#[tokio::test]
async fn test_values_past_the_inference_window_are_kept() {
    let mut trips: Vec<RawTrip> = (0..1100).map(|i| RawTrip::valid(&i.to_string())).collect();
    trips[1050].store_and_fwd_flag = "Y".to_string();
    trips[1075].vendor_id = "VTS".to_string();
    trips[1080].id = "late-text-id".to_string();

    let run = clean_trips(&trips).await;
    assert_eq!(run.report.final_rows, 1100);
    assert_eq!(run.cleaned.row("1050").unwrap()["store_and_fwd_flag"], "Y");
    assert_eq!(run.cleaned.row("1049").unwrap()["store_and_fwd_flag"], "N");
    assert_eq!(run.cleaned.row("1075").unwrap()["vendor_id"], "VTS");
    assert_eq!(run.cleaned.row("1074").unwrap()["vendor_id"], "2");
    assert!(run.cleaned.row("late-text-id").is_some());
}

#[tokio::test]
async fn test_header_follows_output_layout() {
    let run = clean_trips(&[RawTrip::valid("t1")]).await;
    assert_eq!(run.cleaned.header, OUTPUT_COLUMNS.to_vec());
}

#[tokio::test]
async fn test_all_trips_excluded_still_writes_header() {
    let mut crowded = RawTrip::valid("crowded");
    crowded.passenger_count = "12".to_string();
    let run = clean_trips(&[crowded]).await;

    assert_eq!(run.report.final_rows, 0);
    assert!(run.cleaned.rows.is_empty());
    assert_eq!(run.cleaned.header.len(), 27);
    assert_eq!(run.report.statistics.average_speed_kmh, None);
}

#[tokio::test]
async fn test_repeated_runs_are_byte_identical() {
    let mut trips: Vec<RawTrip> = (0..40)
        .map(|i| {
            let mut trip = RawTrip::valid(&format!("id{}", i));
            trip.pickup = (-73.99 + i as f64 * 0.002, 40.71 + i as f64 * 0.003);
            trip.passenger_count = ((i % 11) as i64).to_string();
            trip
        })
        .collect();
    trips.push(trips[3].clone());

    let dir = tempfile::tempdir().unwrap();
    let input = write_raw(dir.path(), &trips);
    let cleaner = TripCleaner::default();
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    cleaner
        .run(&input, &first, &mut ExclusionLog::new())
        .await
        .unwrap();
    cleaner
        .run(&input, &second, &mut ExclusionLog::new())
        .await
        .unwrap();

    let first = std::fs::read(first).unwrap();
    let second = std::fs::read(second).unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_values_are_counted_and_sampled() {
    let mut incomplete = RawTrip::valid("incomplete");
    incomplete.passenger_count = String::new();
    let run = clean_trips(&[RawTrip::valid("t1"), incomplete]).await;

    assert_eq!(run.cleaned.ids(), vec!["t1"]);
    assert!(run.log.events().any(|event| event
        == &AuditEvent::MissingValues {
            column: "passenger_count".to_string(),
            count: 1,
        }));
    assert_eq!(
        run.log.reasons_for("incomplete"),
        vec![&ExclusionReason::MissingValue]
    );
}

#[tokio::test]
async fn test_summary_is_logged_and_appended() {
    let mut crowded = RawTrip::valid("crowded");
    crowded.passenger_count = "10".to_string();
    let run = clean_trips(&[RawTrip::valid("t1"), crowded]).await;

    assert_eq!(
        run.log.events().next(),
        Some(&AuditEvent::InitialCount(2))
    );
    assert_eq!(
        run.log.events().last(),
        Some(&AuditEvent::Summary {
            initial: 2,
            final_count: 1,
            removed: 1,
        })
    );

    let log_path = run.dir.path().join("logs").join("excluded_records.log");
    run.log.append_to_file(&log_path).unwrap();
    let text = std::fs::read_to_string(log_path).unwrap();
    assert!(text
        .lines()
        .last()
        .unwrap()
        .ends_with("Cleaning summary - initial records: 2, final records: 1, total removed: 1"));
}

#[tokio::test]
async fn test_raw_duration_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("train.csv");
    let trip = RawTrip::valid("t1");
    std::fs::write(
        &input,
        format!(
            "{},trip_duration\n{},5\n",
            common::RAW_HEADER,
            trip.to_csv_line()
        ),
    )
    .unwrap();
    let output = dir.path().join("clean.csv");
    TripCleaner::default()
        .run(&input, &output, &mut ExclusionLog::new())
        .await
        .unwrap();

    let cleaned = CleanedFile::read(&output);
    assert!(!cleaned.header.contains(&"trip_duration".to_string()));
    assert_abs_diff_eq!(
        number(cleaned.row("t1").unwrap(), "trip_duration_seconds"),
        900.0
    );
}

#[tokio::test]
async fn test_statistics_describe_cleaned_trips() {
    let mut later = RawTrip::valid("later");
    later.pickup_datetime = "2016-01-05 17:00:00".to_string();
    later.dropoff_datetime = "2016-01-05 17:30:00".to_string();
    let run = clean_trips(&[RawTrip::valid("t1"), later]).await;

    let stats = &run.report.statistics;
    assert_eq!(stats.first_pickup_date.as_deref(), Some("2016-01-01"));
    assert_eq!(stats.last_pickup_date.as_deref(), Some("2016-01-05"));
    assert_abs_diff_eq!(stats.average_duration_minutes.unwrap(), 22.5, epsilon = 1e-9);
    let distance = haversine_km(-73.98, 40.75, -73.99, 40.73, EARTH_RADIUS_KM);
    assert_abs_diff_eq!(stats.average_distance_km.unwrap(), distance, epsilon = 1e-9);
}

#[tokio::test]
async fn test_configuration_overrides_apply() {
    let config = CleaningConfig {
        fares: FareSchedule {
            base_fare: 3.0,
            per_km_rate: 0.0,
            per_minute_rate: 0.0,
        },
        ..CleaningConfig::default()
    };
    let run = clean_trips_with(&[RawTrip::valid("t1")], config).await;
    assert_abs_diff_eq!(
        number(run.cleaned.row("t1").unwrap(), "estimated_fare"),
        3.0
    );

    let config = CleaningConfig {
        plausibility: PlausibilityBounds {
            max_distance_km: Some(1.0),
            ..PlausibilityBounds::default()
        },
        ..CleaningConfig::default()
    };
    let run = clean_trips_with(&[RawTrip::valid("t1")], config).await;
    assert!(run.cleaned.rows.is_empty());
    assert_eq!(
        run.log.reasons_for("t1"),
        vec![&ExclusionReason::InvalidDistance]
    );
}

#[tokio::test]
async fn test_missing_input_produces_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("clean.csv");
    let err = TripCleaner::default()
        .run(dir.path().join("absent.csv"), &output, &mut ExclusionLog::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TripCleanerError::MissingInput(_)));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_unparseable_timestamp_aborts_the_run() {
    let mut broken = RawTrip::valid("broken");
    broken.pickup_datetime = "yesterday morning".to_string();
    let dir = tempfile::tempdir().unwrap();
    let input = write_raw(dir.path(), &[RawTrip::valid("t1"), broken]);
    let output = dir.path().join("clean.csv");

    let err = TripCleaner::default()
        .run(&input, &output, &mut ExclusionLog::new())
        .await
        .unwrap_err();
    match &err {
        TripCleanerError::StageFailed { stage, .. } => assert_eq!(stage, "temporal normalizer"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(
        err.root_cause(),
        TripCleanerError::InvalidTimestamp { column, .. } if column == "pickup_datetime"
    ));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_failed_write_records_no_summary() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_raw(dir.path(), &[RawTrip::valid("t1")]);
    // A regular file where the output directory should be.
    let blocker = dir.path().join("processed");
    std::fs::write(&blocker, "not a directory").unwrap();
    let output = blocker.join("clean_trips.csv");

    let mut log = ExclusionLog::new();
    let err = TripCleaner::default()
        .run(&input, &output, &mut log)
        .await
        .unwrap_err();
    assert!(matches!(err, TripCleanerError::IoError(_)));
    assert_eq!(log.events().next(), Some(&AuditEvent::InitialCount(1)));
    assert!(!log
        .events()
        .any(|event| matches!(event, AuditEvent::Summary { .. })));
    assert!(!output.exists());
}
