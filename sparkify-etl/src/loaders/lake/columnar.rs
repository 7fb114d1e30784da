//! Row <-> Arrow record batch conversion for the lake tables
//!
//! Partition columns stay inside the files, so a file read on its own
//! yields complete rows. `songplays` additionally carries a `songplay_id`
//! derived from the natural key, plus `year`/`month` for partitioning.

use crate::error::StoreError;
use crate::models::{Artist, Entity, Gender, Row, Song, Songplay, TimeBucket, User};
use crate::services::build_time_bucket;
use arrow_array::{
    Array, ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampMillisecondArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Utc};
use sparkify_common::time::from_epoch_millis;
use std::sync::Arc;
use uuid::Uuid;

const UTC: &str = "UTC";

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some(UTC.into()))
}

/// Arrow schema of one table
pub fn schema(entity: Entity) -> SchemaRef {
    let fields = match entity {
        Entity::Songs => vec![
            Field::new("song_id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("artist_id", DataType::Utf8, false),
            Field::new("year", DataType::Int32, false),
            Field::new("duration", DataType::Float64, false),
        ],
        Entity::Artists => vec![
            Field::new("artist_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("location", DataType::Utf8, true),
            Field::new("latitude", DataType::Float64, true),
            Field::new("longitude", DataType::Float64, true),
        ],
        Entity::Users => vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("first_name", DataType::Utf8, true),
            Field::new("last_name", DataType::Utf8, true),
            Field::new("gender", DataType::Utf8, false),
            Field::new("level", DataType::Utf8, false),
        ],
        Entity::Time => vec![
            Field::new("start_time", timestamp_type(), false),
            Field::new("hour", DataType::UInt32, false),
            Field::new("day", DataType::UInt32, false),
            Field::new("week", DataType::UInt32, false),
            Field::new("month", DataType::UInt32, false),
            Field::new("year", DataType::Int32, false),
            Field::new("weekday", DataType::UInt32, false),
        ],
        Entity::Songplays => vec![
            Field::new("songplay_id", DataType::Utf8, false),
            Field::new("start_time", timestamp_type(), false),
            Field::new("user_id", DataType::Int64, false),
            Field::new("level", DataType::Utf8, false),
            Field::new("song_id", DataType::Utf8, true),
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("session_id", DataType::Int64, false),
            Field::new("location", DataType::Utf8, true),
            Field::new("user_agent", DataType::Utf8, true),
            Field::new("year", DataType::Int32, false),
            Field::new("month", DataType::UInt32, false),
        ],
    };
    Arc::new(Schema::new(fields))
}

/// Stable surrogate id: the same natural key always maps to the same id
pub fn songplay_id(songplay: &Songplay) -> String {
    let name = format!(
        "{}:{}:{}",
        songplay.user_id,
        songplay.session_id,
        songplay.start_time.timestamp_millis()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn timestamps(values: Vec<i64>) -> TimestampMillisecondArray {
    TimestampMillisecondArray::from(values).with_timezone(UTC)
}

/// Build a record batch from the rows of one entity; other rows are ignored
pub fn to_batch(entity: Entity, rows: &[Row]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = match entity {
        Entity::Songs => {
            let songs: Vec<&Song> = rows
                .iter()
                .filter_map(|r| match r {
                    Row::Song(s) => Some(s),
                    _ => None,
                })
                .collect();
            vec![
                Arc::new(StringArray::from_iter_values(songs.iter().map(|s| s.song_id.as_str()))),
                Arc::new(StringArray::from_iter_values(songs.iter().map(|s| s.title.as_str()))),
                Arc::new(StringArray::from_iter_values(songs.iter().map(|s| s.artist_id.as_str()))),
                Arc::new(Int32Array::from_iter_values(songs.iter().map(|s| s.year))),
                Arc::new(Float64Array::from_iter_values(songs.iter().map(|s| s.duration))),
            ]
        }
        Entity::Artists => {
            let artists: Vec<&Artist> = rows
                .iter()
                .filter_map(|r| match r {
                    Row::Artist(a) => Some(a),
                    _ => None,
                })
                .collect();
            vec![
                Arc::new(StringArray::from_iter_values(artists.iter().map(|a| a.artist_id.as_str()))),
                Arc::new(StringArray::from_iter_values(artists.iter().map(|a| a.name.as_str()))),
                Arc::new(StringArray::from(
                    artists.iter().map(|a| a.location.as_deref()).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(artists.iter().map(|a| a.latitude).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(artists.iter().map(|a| a.longitude).collect::<Vec<_>>())),
            ]
        }
        Entity::Users => {
            let users: Vec<&User> = rows
                .iter()
                .filter_map(|r| match r {
                    Row::User(u) => Some(u),
                    _ => None,
                })
                .collect();
            vec![
                Arc::new(Int64Array::from_iter_values(users.iter().map(|u| u.user_id))),
                Arc::new(StringArray::from(
                    users.iter().map(|u| u.first_name.as_deref()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    users.iter().map(|u| u.last_name.as_deref()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from_iter_values(users.iter().map(|u| u.gender.as_str()))),
                Arc::new(StringArray::from_iter_values(users.iter().map(|u| u.level.as_str()))),
            ]
        }
        Entity::Time => {
            let buckets: Vec<&TimeBucket> = rows
                .iter()
                .filter_map(|r| match r {
                    Row::Time(t) => Some(t),
                    _ => None,
                })
                .collect();
            vec![
                Arc::new(timestamps(
                    buckets.iter().map(|t| t.start_time.timestamp_millis()).collect(),
                )),
                Arc::new(UInt32Array::from_iter_values(buckets.iter().map(|t| t.hour))),
                Arc::new(UInt32Array::from_iter_values(buckets.iter().map(|t| t.day))),
                Arc::new(UInt32Array::from_iter_values(buckets.iter().map(|t| t.week))),
                Arc::new(UInt32Array::from_iter_values(buckets.iter().map(|t| t.month))),
                Arc::new(Int32Array::from_iter_values(buckets.iter().map(|t| t.year))),
                Arc::new(UInt32Array::from_iter_values(buckets.iter().map(|t| t.weekday))),
            ]
        }
        Entity::Songplays => {
            let plays: Vec<&Songplay> = rows
                .iter()
                .filter_map(|r| match r {
                    Row::Songplay(p) => Some(p),
                    _ => None,
                })
                .collect();
            // Partition columns come from the same derivation as the time table
            let calendar: Vec<TimeBucket> =
                plays.iter().map(|p| build_time_bucket(p.start_time)).collect();
            vec![
                Arc::new(StringArray::from_iter_values(plays.iter().map(|p| songplay_id(p)))),
                Arc::new(timestamps(
                    plays.iter().map(|p| p.start_time.timestamp_millis()).collect(),
                )),
                Arc::new(Int64Array::from_iter_values(plays.iter().map(|p| p.user_id))),
                Arc::new(StringArray::from_iter_values(plays.iter().map(|p| p.level.as_str()))),
                Arc::new(StringArray::from(
                    plays.iter().map(|p| p.song_id.as_deref()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    plays.iter().map(|p| p.artist_id.as_deref()).collect::<Vec<_>>(),
                )),
                Arc::new(Int64Array::from_iter_values(plays.iter().map(|p| p.session_id))),
                Arc::new(StringArray::from(
                    plays.iter().map(|p| p.location.as_deref()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    plays.iter().map(|p| p.user_agent.as_deref()).collect::<Vec<_>>(),
                )),
                Arc::new(Int32Array::from_iter_values(calendar.iter().map(|t| t.year))),
                Arc::new(UInt32Array::from_iter_values(calendar.iter().map(|t| t.month))),
            ]
        }
    };

    Ok(RecordBatch::try_new(schema(entity), columns)?)
}

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<A>())
        .ok_or_else(|| StoreError::Fatal(format!("column {} missing or of unexpected type", name)))
}

fn opt_string(array: &StringArray, i: usize) -> Option<String> {
    if array.is_null(i) {
        None
    } else {
        Some(array.value(i).to_string())
    }
}

fn opt_f64(array: &Float64Array, i: usize) -> Option<f64> {
    if array.is_null(i) {
        None
    } else {
        Some(array.value(i))
    }
}

fn instant(array: &TimestampMillisecondArray, i: usize) -> Result<DateTime<Utc>, StoreError> {
    let millis = array.value(i);
    from_epoch_millis(millis)
        .map_err(|_| StoreError::Fatal(format!("stored timestamp out of range: {}", millis)))
}

fn level(value: &str) -> Result<crate::models::Level, StoreError> {
    crate::models::Level::from_db(value)
        .ok_or_else(|| StoreError::Fatal(format!("stored level is invalid: {}", value)))
}

/// Decode the rows of one entity from a record batch
pub fn from_batch(entity: Entity, batch: &RecordBatch) -> Result<Vec<Row>, StoreError> {
    let n = batch.num_rows();
    let mut rows = Vec::with_capacity(n);

    match entity {
        Entity::Songs => {
            let song_id = column::<StringArray>(batch, "song_id")?;
            let title = column::<StringArray>(batch, "title")?;
            let artist_id = column::<StringArray>(batch, "artist_id")?;
            let year = column::<Int32Array>(batch, "year")?;
            let duration = column::<Float64Array>(batch, "duration")?;
            for i in 0..n {
                rows.push(Row::Song(Song {
                    song_id: song_id.value(i).to_string(),
                    title: title.value(i).to_string(),
                    artist_id: artist_id.value(i).to_string(),
                    year: year.value(i),
                    duration: duration.value(i),
                }));
            }
        }
        Entity::Artists => {
            let artist_id = column::<StringArray>(batch, "artist_id")?;
            let name = column::<StringArray>(batch, "name")?;
            let location = column::<StringArray>(batch, "location")?;
            let latitude = column::<Float64Array>(batch, "latitude")?;
            let longitude = column::<Float64Array>(batch, "longitude")?;
            for i in 0..n {
                rows.push(Row::Artist(Artist {
                    artist_id: artist_id.value(i).to_string(),
                    name: name.value(i).to_string(),
                    location: opt_string(location, i),
                    latitude: opt_f64(latitude, i),
                    longitude: opt_f64(longitude, i),
                }));
            }
        }
        Entity::Users => {
            let user_id = column::<Int64Array>(batch, "user_id")?;
            let first_name = column::<StringArray>(batch, "first_name")?;
            let last_name = column::<StringArray>(batch, "last_name")?;
            let gender = column::<StringArray>(batch, "gender")?;
            let lvl = column::<StringArray>(batch, "level")?;
            for i in 0..n {
                rows.push(Row::User(User {
                    user_id: user_id.value(i),
                    first_name: opt_string(first_name, i),
                    last_name: opt_string(last_name, i),
                    gender: Gender::from_code(gender.value(i)),
                    level: level(lvl.value(i))?,
                }));
            }
        }
        Entity::Time => {
            // Calendar fields are derived, so only the key is read back
            let start_time = column::<TimestampMillisecondArray>(batch, "start_time")?;
            for i in 0..n {
                rows.push(Row::Time(build_time_bucket(instant(start_time, i)?)));
            }
        }
        Entity::Songplays => {
            let start_time = column::<TimestampMillisecondArray>(batch, "start_time")?;
            let user_id = column::<Int64Array>(batch, "user_id")?;
            let lvl = column::<StringArray>(batch, "level")?;
            let song_id = column::<StringArray>(batch, "song_id")?;
            let artist_id = column::<StringArray>(batch, "artist_id")?;
            let session_id = column::<Int64Array>(batch, "session_id")?;
            let location = column::<StringArray>(batch, "location")?;
            let user_agent = column::<StringArray>(batch, "user_agent")?;
            for i in 0..n {
                rows.push(Row::Songplay(Songplay {
                    start_time: instant(start_time, i)?,
                    user_id: user_id.value(i),
                    level: level(lvl.value(i))?,
                    song_id: opt_string(song_id, i),
                    artist_id: opt_string(artist_id, i),
                    session_id: session_id.value(i),
                    location: opt_string(location, i),
                    user_agent: opt_string(user_agent, i),
                }));
            }
        }
    }

    Ok(rows)
}
