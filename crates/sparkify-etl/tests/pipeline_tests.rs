//! End-to-end loader tests against the in-memory engine
//!
//! Each test writes a small song_data/log_data tree, runs the batch driver
//! and inspects the committed tables.

mod common;

use anyhow::Result;
use chrono::NaiveDateTime;
use common::{init_tracing, Dataset, EventFixture, SongFixture};
use sparkify_etl::models::TimeBucket;
use sparkify_etl::pipeline::{BatchDriver, DataType, PipelineOptions};
use sparkify_etl::queries::TableName;
use sparkify_etl::resolve::DurationMatch;
use sparkify_etl::storage::{MemorySession, ToSqlValues, TIMESTAMP_FORMAT};
use sparkify_etl::{FileErrorKind, FileStatus};

const TS_1: i64 = 1541106106796;
const TS_2: i64 = 1541106132796;
const TS_3: i64 = 1541106496796;

fn driver() -> BatchDriver<MemorySession> {
    init_tracing();
    BatchDriver::new(MemorySession::new(), PipelineOptions::default())
}

fn column(driver: &BatchDriver<MemorySession>, table: TableName, name: &str) -> Vec<Option<String>> {
    driver.session().column_values(table, name)
}

#[tokio::test]
async fn test_song_file_loads_song_and_artist() -> Result<()> {
    let data = Dataset::new()?;
    data.add_song("A/A/A/TRAAAAK128F9318786.json", &SongFixture::girl_in_the_village())?;

    let mut driver = driver();
    let report = driver.run(DataType::Song, &data.song_root()).await?;

    assert_eq!(report.discovered, 1);
    assert_eq!(report.succeeded(), 1);

    let songs = driver.session().table_rows(TableName::Songs);
    assert_eq!(songs.len(), 1);
    assert_eq!(
        songs[0],
        vec![
            Some("SOSVGKG12AB0184039".to_string()),
            Some("Girl In The Village".to_string()),
            Some("ARQTC121187FB3B0A4".to_string()),
            Some("0".to_string()),
            Some("175".to_string()),
        ]
    );

    let artists = driver.session().table_rows(TableName::Artists);
    assert_eq!(artists.len(), 1);
    assert_eq!(artists[0][0].as_deref(), Some("ARQTC121187FB3B0A4"));
    assert_eq!(artists[0][1].as_deref(), Some("Bitter:Sweet"));
    assert_eq!(artists[0][3], None);
    Ok(())
}

#[tokio::test]
async fn test_song_and_artist_first_write_wins() -> Result<()> {
    let data = Dataset::new()?;
    data.add_song("A/A/A/TRAAA1.json", &SongFixture::girl_in_the_village())?;
    let mut renamed = SongFixture::girl_in_the_village();
    renamed.title = "Girl In The City".to_string();
    renamed.artist_name = "Sweet:Bitter".to_string();
    data.add_song("A/A/B/TRAAB1.json", &renamed)?;

    let mut driver = driver();
    let report = driver.run(DataType::Song, &data.song_root()).await?;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(
        column(&driver, TableName::Songs, "title"),
        vec![Some("Girl In The Village".to_string())]
    );
    assert_eq!(
        column(&driver, TableName::Artists, "name"),
        vec![Some("Bitter:Sweet".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_only_played_events_reach_destination_tables() -> Result<()> {
    let data = Dataset::new()?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[
            EventFixture::played("8", TS_1, 139).page("Home"),
            EventFixture::played("26", TS_2, 583),
            EventFixture::played("", TS_3, 112).page("Logout"),
            EventFixture::played("26", TS_3, 583),
        ],
    )?;

    let mut driver = driver();
    let report = driver.run(DataType::Log, &data.log_root()).await?;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(driver.session().row_count(TableName::Time), 2);
    assert_eq!(driver.session().row_count(TableName::Songplays), 2);
    assert_eq!(
        column(&driver, TableName::Users, "user_id"),
        vec![Some("26".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_time_rows_are_unique_and_rederivable() -> Result<()> {
    let data = Dataset::new()?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[
            EventFixture::played("10", TS_1, 1),
            EventFixture::played("11", TS_1, 2),
            EventFixture::played("10", TS_2, 1),
        ],
    )?;

    let mut driver = driver();
    let report = driver.run(DataType::Log, &data.log_root()).await?;
    assert_eq!(report.succeeded(), 1);

    let rows = driver.session().table_rows(TableName::Time);
    assert_eq!(rows.len(), 2, "same instant must collapse to one time row");
    assert_eq!(driver.session().row_count(TableName::Songplays), 3);

    for row in rows {
        let start = row[0].as_deref().unwrap_or_default();
        let start = NaiveDateTime::parse_from_str(start, TIMESTAMP_FORMAT)?;
        let rederived: Vec<Option<String>> = TimeBucket::from_start_time(start)
            .to_sql_values()
            .iter()
            .map(|v| v.to_text())
            .collect();
        assert_eq!(rederived, row);
    }
    Ok(())
}

#[tokio::test]
async fn test_user_level_last_write_wins() -> Result<()> {
    let data = Dataset::new()?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[EventFixture::played("15", TS_1, 818).level("free")],
    )?;
    data.add_log(
        "2018/11/2018-11-02-events.json",
        &[EventFixture::played("15", TS_2, 818).level("paid")],
    )?;

    let mut driver = driver();
    let report = driver.run(DataType::Log, &data.log_root()).await?;

    assert_eq!(report.succeeded(), 2);
    let users = driver.session().table_rows(TableName::Users);
    assert_eq!(users.len(), 1);
    assert_eq!(users[0][4].as_deref(), Some("paid"));
    Ok(())
}

#[tokio::test]
async fn test_user_level_within_one_file_ends_on_last_event() -> Result<()> {
    let data = Dataset::new()?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[
            EventFixture::played("15", TS_1, 818).level("free"),
            EventFixture::played("15", TS_2, 818).level("paid"),
            EventFixture::played("15", TS_3, 818).level("free"),
        ],
    )?;

    let mut driver = driver();
    let report = driver.run(DataType::Log, &data.log_root()).await?;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(
        column(&driver, TableName::Users, "level"),
        vec![Some("free".to_string())]
    );
    assert_eq!(driver.session().row_count(TableName::Songplays), 3);
    Ok(())
}

#[tokio::test]
async fn test_songplays_resolve_matching_triples_only() -> Result<()> {
    let data = Dataset::new()?;
    data.add_song(
        "A/A/A/TRAAA1.json",
        &SongFixture::new("SOZCTXZ12AB0182364", "Setanta matins", "ARKRRTF1187B9984DA", "Elena", 269.58322),
    )?;
    data.add_log(
        "2018/11/2018-11-21-events.json",
        &[
            EventFixture::played("15", TS_1, 818).song("Setanta matins", "Elena", 269.58322),
            EventFixture::played("15", TS_2, 818).song("Setanta matins", "Elena", 269.5832),
            EventFixture::played("15", TS_3, 818).song("Yellow", "Coldplay", 269.11302),
        ],
    )?;

    let mut driver = driver();
    let reports = driver.run_all(&data.song_root(), &data.log_root()).await?;

    assert!(reports.iter().all(|r| !r.has_failures()));
    assert_eq!(reports[1].rows().songplays, 3);
    assert_eq!(reports[1].rows().songplays_matched, 1);
    assert_eq!(
        column(&driver, TableName::Songplays, "song_id"),
        vec![Some("SOZCTXZ12AB0182364".to_string()), None, None]
    );
    assert_eq!(
        column(&driver, TableName::Songplays, "artist_id"),
        vec![Some("ARKRRTF1187B9984DA".to_string()), None, None]
    );
    Ok(())
}

#[tokio::test]
async fn test_duration_tolerance_widens_matches() -> Result<()> {
    let data = Dataset::new()?;
    data.add_song(
        "A/A/A/TRAAA1.json",
        &SongFixture::new("SOZCTXZ12AB0182364", "Setanta matins", "ARKRRTF1187B9984DA", "Elena", 269.58322),
    )?;
    data.add_log(
        "2018/11/2018-11-21-events.json",
        &[EventFixture::played("15", TS_1, 818).song("Setanta matins", "Elena", 269.5832)],
    )?;

    let options = PipelineOptions {
        duration_match: DurationMatch::Tolerance(0.001),
        ..PipelineOptions::default()
    };
    let mut driver = BatchDriver::new(MemorySession::new(), options);
    driver.run_all(&data.song_root(), &data.log_root()).await?;

    assert_eq!(
        column(&driver, TableName::Songplays, "song_id"),
        vec![Some("SOZCTXZ12AB0182364".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_duplicate_songplay_fails_only_that_file() -> Result<()> {
    let data = Dataset::new()?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[
            EventFixture::played("15", TS_1, 818),
            EventFixture::played("15", TS_1, 818).song("Yellow", "Coldplay", 269.11302),
        ],
    )?;
    data.add_log(
        "2018/11/2018-11-02-events.json",
        &[EventFixture::played("15", TS_2, 818)],
    )?;

    let mut driver = driver();
    let report = driver.run(DataType::Log, &data.log_root()).await?;

    assert_eq!(report.attempted(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);

    let failed = report.failures().next().map(|o| (o.index, o.status.clone()));
    assert!(matches!(
        failed,
        Some((1, FileStatus::Failed { kind: FileErrorKind::KeyCollision, .. }))
    ));

    // Only the second file's rows survive; the first was rolled back whole
    assert_eq!(driver.session().row_count(TableName::Songplays), 1);
    assert_eq!(driver.session().row_count(TableName::Time), 1);
    assert!(!driver.session().in_transaction());
    Ok(())
}

#[tokio::test]
async fn test_time_seen_in_earlier_file_fails_later_file() -> Result<()> {
    let data = Dataset::new()?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[EventFixture::played("15", TS_1, 818)],
    )?;
    data.add_log(
        "2018/11/2018-11-02-events.json",
        &[EventFixture::played("16", TS_1, 900)],
    )?;

    let mut driver = driver();
    let report = driver.run(DataType::Log, &data.log_root()).await?;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(
        column(&driver, TableName::Users, "user_id"),
        vec![Some("15".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_malformed_log_file_is_reported_and_skipped() -> Result<()> {
    let data = Dataset::new()?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[EventFixture::played("15", TS_1, 818)],
    )?;
    std::fs::write(data.log_root().join("2018/11/2018-11-02-events.json"), "{\"ts\": ")?;
    data.add_log(
        "2018/11/2018-11-03-events.json",
        &[EventFixture::played("15", TS_3, 818)],
    )?;

    let mut driver = driver();
    let report = driver.run(DataType::Log, &data.log_root()).await?;

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.succeeded(), 2);
    let failure = report.failures().next().map(|o| (o.index, o.status.clone()));
    assert!(matches!(
        failure,
        Some((2, FileStatus::Failed { kind: FileErrorKind::Parse, .. }))
    ));
    assert_eq!(driver.session().row_count(TableName::Songplays), 2);
    Ok(())
}

#[tokio::test]
async fn test_fail_fast_skips_log_run() -> Result<()> {
    let data = Dataset::new()?;
    data.add_song_lines("A/A/A/TRAAA1.json", &["{\"song_id\": ".to_string()])?;
    data.add_log(
        "2018/11/2018-11-01-events.json",
        &[EventFixture::played("15", TS_1, 818)],
    )?;

    let options = PipelineOptions {
        fail_fast: true,
        ..PipelineOptions::default()
    };
    let mut driver = BatchDriver::new(MemorySession::new(), options);
    let reports = driver.run_all(&data.song_root(), &data.log_root()).await?;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].has_failures());
    assert_eq!(driver.session().row_count(TableName::Songplays), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_roots_are_not_fatal() -> Result<()> {
    let data = Dataset::new()?;

    let mut driver = driver();
    let reports = driver.run_all(&data.song_root(), &data.log_root()).await?;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.discovered == 0 && r.attempted() == 0));
    Ok(())
}
