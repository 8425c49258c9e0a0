//! Ingestion of base requests and execution of stat queries.
//!
//! The request/response tree is handled as generic `serde_json::Value`s.
//! Ingestion errors (missing fields, wrong types, unknown references) abort
//! the build; query-time "not found" is a normal response variant.

pub mod builder;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::info;

use crate::catalogue::{Catalogue, StopId};
use crate::render::{Color, Point, RenderSettings};
use crate::router::{PlanItem, RouteError, RouterSettings, TransportRouter};
use builder::ValueBuilder;

/// Everything the build phase extracts from its request tree.
pub struct BuildInput {
    pub catalogue: Catalogue,
    pub render: RenderSettings,
    pub router: RouterSettings,
    pub snapshot_file: Option<PathBuf>,
}

/// Everything the serve phase extracts from its request tree.
pub struct ServeInput {
    pub snapshot_file: Option<PathBuf>,
    pub stat_requests: Vec<Value>,
}

/// Parses a build request tree and populates a fresh catalogue. Stops are
/// created first, then buses, then the deferred road distances, so input
/// order never matters.
pub fn ingest(root: &Value) -> Result<BuildInput> {
    let root = as_object(root).context("top-level request tree")?;

    let mut catalogue = Catalogue::new();
    let mut deferred: Vec<(StopId, &Map<String, Value>)> = Vec::new();

    let base_requests = match root.get("base_requests") {
        Some(value) => value.as_array().context("base_requests must be an array")?.as_slice(),
        None => &[],
    };

    // Pass 1: stops, with their road_distances kept for later.
    for entry in base_requests {
        let entry = as_object(entry).context("base request")?;
        if str_field(entry, "type")? != "Stop" {
            continue;
        }
        let name = str_field(entry, "name")?;
        let coordinates = crate::geo::Coordinates {
            lat: f64_field(entry, "latitude")?,
            lng: f64_field(entry, "longitude")?,
        };
        let id = catalogue
            .add_stop(name, coordinates)
            .with_context(|| format!("adding stop {name:?}"))?;
        if let Some(distances) = entry.get("road_distances") {
            deferred.push((
                id,
                distances
                    .as_object()
                    .with_context(|| format!("road_distances of stop {name:?}"))?,
            ));
        }
    }

    // Pass 2: buses.
    for entry in base_requests {
        let entry = as_object(entry).context("base request")?;
        if str_field(entry, "type")? != "Bus" {
            continue;
        }
        let name = str_field(entry, "name")?;
        let stops = entry
            .get("stops")
            .and_then(Value::as_array)
            .with_context(|| format!("stops of bus {name:?}"))?
            .iter()
            .map(|s| s.as_str().map(str::to_string).context("stop name must be a string"))
            .collect::<Result<Vec<_>>>()?;
        let is_roundtrip = bool_field(entry, "is_roundtrip")?;
        catalogue
            .add_bus(name, &stops, is_roundtrip)
            .with_context(|| format!("adding bus {name:?}"))?;
    }

    // Pass 3: replay the deferred distances, now that every stop exists.
    for (from, distances) in deferred {
        for (to_name, meters) in distances {
            let to = catalogue
                .find_stop(to_name)
                .with_context(|| format!("road distance to unknown stop {to_name:?}"))?;
            let meters = meters
                .as_f64()
                .with_context(|| format!("road distance to {to_name:?} must be a number"))?;
            catalogue.set_distance(from, to, meters);
        }
    }

    let render = match root.get("render_settings") {
        Some(value) => parse_render_settings(as_object(value).context("render_settings")?)?,
        None => RenderSettings::default(),
    };
    let router = match root.get("routing_settings") {
        Some(value) => {
            let settings = as_object(value).context("routing_settings")?;
            RouterSettings {
                bus_wait_time: f64_field(settings, "bus_wait_time")?,
                bus_velocity: f64_field(settings, "bus_velocity")?,
            }
        }
        None => RouterSettings::default(),
    };

    info!(
        stops = catalogue.stop_count(),
        buses = catalogue.buses().count(),
        "base requests ingested"
    );

    Ok(BuildInput {
        catalogue,
        render,
        router,
        snapshot_file: snapshot_file(root)?,
    })
}

/// Splits a serve request tree into the snapshot location and the queries.
pub fn parse_serve_input(root: &Value) -> Result<ServeInput> {
    let root = as_object(root).context("top-level request tree")?;
    let stat_requests = match root.get("stat_requests") {
        Some(value) => value
            .as_array()
            .context("stat_requests must be an array")?
            .clone(),
        None => Vec::new(),
    };
    Ok(ServeInput {
        snapshot_file: snapshot_file(root)?,
        stat_requests,
    })
}

fn snapshot_file(root: &Map<String, Value>) -> Result<Option<PathBuf>> {
    let Some(settings) = root.get("serialization_settings") else {
        return Ok(None);
    };
    let settings = as_object(settings).context("serialization_settings")?;
    Ok(Some(PathBuf::from(str_field(settings, "file")?)))
}

/// Answers stat requests over a finished catalogue.
pub struct QueryEngine<'a> {
    catalogue: &'a Catalogue,
    router: TransportRouter<'a>,
}

impl<'a> QueryEngine<'a> {
    pub fn new(catalogue: &'a Catalogue, settings: RouterSettings) -> Self {
        Self {
            catalogue,
            router: TransportRouter::build(catalogue, settings),
        }
    }

    /// One response per request, input order. Not-found outcomes are data;
    /// only a malformed request aborts the batch.
    pub fn execute(&self, stat_requests: &[Value]) -> Result<Value> {
        let mut answers = ValueBuilder::new();
        answers.start_array()?;
        for request in stat_requests {
            let request = as_object(request).context("stat request")?;
            answers.value(self.answer(request)?)?;
        }
        answers.end_array()?;
        Ok(answers.build()?)
    }

    fn answer(&self, request: &Map<String, Value>) -> Result<Value> {
        let id = request
            .get("id")
            .and_then(Value::as_i64)
            .context("stat request must carry an integer id")?;
        let kind = str_field(request, "type")?;
        match kind {
            "Stop" => self.answer_stop(id, str_field(request, "name")?),
            "Bus" => self.answer_bus(id, str_field(request, "name")?),
            "Route" => self.answer_route(id, str_field(request, "from")?, str_field(request, "to")?),
            other => bail!("unknown stat request type {other:?}"),
        }
    }

    fn answer_stop(&self, id: i64, name: &str) -> Result<Value> {
        let Some(buses) = self.catalogue.buses_for_stop(name) else {
            return not_found(id);
        };
        let mut b = ValueBuilder::new();
        b.start_object()?
            .key("request_id")?
            .value(id)?
            .key("buses")?
            .start_array()?;
        for bus in buses {
            b.value(bus.as_str())?;
        }
        b.end_array()?.end_object()?;
        Ok(b.build()?)
    }

    fn answer_bus(&self, id: i64, name: &str) -> Result<Value> {
        let Some(stats) = self.catalogue.bus_stats(name) else {
            return not_found(id);
        };
        let mut b = ValueBuilder::new();
        b.start_object()?
            .key("request_id")?
            .value(id)?
            .key("curvature")?
            .value(stats.curvature)?
            .key("route_length")?
            .value(stats.route_length)?
            .key("stop_count")?
            .value(stats.stop_count as u64)?
            .key("unique_stop_count")?
            .value(stats.unique_stop_count as u64)?
            .end_object()?;
        Ok(b.build()?)
    }

    fn answer_route(&self, id: i64, from: &str, to: &str) -> Result<Value> {
        let plan = match self.router.route(from, to) {
            Ok(Some(plan)) => plan,
            // An unreachable pair and an unknown stop both answer "not
            // found"; only the latter is an error inside the router.
            Ok(None) | Err(RouteError::UnknownStop(_)) => return not_found(id),
        };

        let mut b = ValueBuilder::new();
        b.start_object()?
            .key("request_id")?
            .value(id)?
            .key("total_time")?
            .value(plan.total_minutes)?
            .key("items")?
            .start_array()?;
        for item in &plan.items {
            match item {
                PlanItem::Wait { stop, minutes } => {
                    b.start_object()?
                        .key("type")?
                        .value("Wait")?
                        .key("stop")?
                        .value(stop.as_str())?
                        .key("time")?
                        .value(*minutes)?
                        .end_object()?;
                }
                PlanItem::Ride {
                    bus,
                    span_count,
                    minutes,
                } => {
                    b.start_object()?
                        .key("type")?
                        .value("Bus")?
                        .key("bus")?
                        .value(bus.as_str())?
                        .key("span_count")?
                        .value(*span_count)?
                        .key("time")?
                        .value(*minutes)?
                        .end_object()?;
                }
            }
        }
        b.end_array()?.end_object()?;
        Ok(b.build()?)
    }
}

fn not_found(id: i64) -> Result<Value> {
    let mut b = ValueBuilder::new();
    b.start_object()?
        .key("request_id")?
        .value(id)?
        .key("error_message")?
        .value("not found")?
        .end_object()?;
    Ok(b.build()?)
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value.as_object().context("expected a JSON object")
}

fn str_field<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing or non-string field {key:?}"))
}

fn f64_field(object: &Map<String, Value>, key: &str) -> Result<f64> {
    object
        .get(key)
        .and_then(Value::as_f64)
        .with_context(|| format!("missing or non-numeric field {key:?}"))
}

fn bool_field(object: &Map<String, Value>, key: &str) -> Result<bool> {
    object
        .get(key)
        .and_then(Value::as_bool)
        .with_context(|| format!("missing or non-boolean field {key:?}"))
}

fn u32_field(object: &Map<String, Value>, key: &str) -> Result<u32> {
    object
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .with_context(|| format!("missing or non-integer field {key:?}"))
}

fn parse_render_settings(settings: &Map<String, Value>) -> Result<RenderSettings> {
    let mut out = RenderSettings::default();
    for (key, value) in settings {
        match key.as_str() {
            "width" => out.width = f64_field(settings, key)?,
            "height" => out.height = f64_field(settings, key)?,
            "padding" => out.padding = f64_field(settings, key)?,
            "line_width" => out.line_width = f64_field(settings, key)?,
            "stop_radius" => out.stop_radius = f64_field(settings, key)?,
            "underlayer_width" => out.underlayer_width = f64_field(settings, key)?,
            "bus_label_font_size" => out.bus_label_font_size = u32_field(settings, key)?,
            "stop_label_font_size" => out.stop_label_font_size = u32_field(settings, key)?,
            "bus_label_offset" => out.bus_label_offset = parse_point(value)?,
            "stop_label_offset" => out.stop_label_offset = parse_point(value)?,
            "underlayer_color" => out.underlayer_color = parse_color(value)?,
            "color_palette" => {
                out.color_palette = value
                    .as_array()
                    .context("color_palette must be an array")?
                    .iter()
                    .map(parse_color)
                    .collect::<Result<Vec<_>>>()?;
            }
            // The settings block belongs to the rendering collaborator;
            // unrecognized keys pass through it, not through us.
            _ => {}
        }
    }
    Ok(out)
}

fn parse_point(value: &Value) -> Result<Point> {
    let parts = value.as_array().context("offset must be an array of two numbers")?;
    match parts.as_slice() {
        [x, y] => Ok(Point {
            x: x.as_f64().context("offset x must be a number")?,
            y: y.as_f64().context("offset y must be a number")?,
        }),
        _ => bail!("offset must be an array of two numbers"),
    }
}

fn parse_color(value: &Value) -> Result<Color> {
    if let Some(name) = value.as_str() {
        return Ok(Color::Name(name.to_string()));
    }
    let parts = value.as_array().context("color must be a string or an array")?;
    let channel = |v: &Value| -> Result<u8> {
        v.as_u64()
            .and_then(|c| u8::try_from(c).ok())
            .context("color channel must be an integer in 0..=255")
    };
    match parts.as_slice() {
        [r, g, b] => Ok(Color::Rgb {
            red: channel(r)?,
            green: channel(g)?,
            blue: channel(b)?,
        }),
        [r, g, b, a] => Ok(Color::Rgba {
            red: channel(r)?,
            green: channel(g)?,
            blue: channel(b)?,
            opacity: a.as_f64().context("opacity must be a number")?,
        }),
        _ => bail!("color array must have 3 or 4 elements"),
    }
}
