//! snapshot.bin format - the single artifact handed from the build phase to
//! the serve phase.
//!
//! Layout (all integers little-endian): a fixed header (magic, version,
//! record counts), stop records keyed by their catalogue ids, bus records
//! (stop id lists), the explicitly-set distance directions only, render and
//! router settings, then a CRC-64 footer over everything before it. Decode
//! validates magic, version, checksum, UTF-8, and id references before any
//! state is handed out; a corrupt file never yields a partial store.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::crc;
use crate::catalogue::{Catalogue, CatalogueError};
use crate::geo::Coordinates;
use crate::render::{Color, Point, RenderSettings};
use crate::router::RouterSettings;

const MAGIC: u32 = 0x5452_534E; // "TRSN"
const VERSION: u16 = 1;
const HEADER_LEN: usize = 20;
const FOOTER_LEN: usize = 8;

const COLOR_NAME: u8 = 0;
const COLOR_RGB: u8 = 1;
const COLOR_RGBA: u8 = 2;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot truncated at offset {0}")]
    Truncated(usize),
    #[error("invalid magic number: {0:08x}")]
    BadMagic(u32),
    #[error("unsupported version: {0}")]
    BadVersion(u16),
    #[error("checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    BadChecksum { expected: u64, actual: u64 },
    #[error("string at offset {0} is not valid UTF-8")]
    BadString(usize),
    #[error("unknown color tag: {0}")]
    BadColorTag(u8),
    #[error("unexpected trailing bytes at offset {0}")]
    TrailingBytes(usize),
    #[error("record references unknown stop id {0}")]
    UnknownStopId(u32),
    #[error("snapshot replay rejected: {0}")]
    Replay(#[from] CatalogueError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopRecord {
    pub id: u32,
    pub name: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    pub name: String,
    pub is_roundtrip: bool,
    pub stops: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    pub from: u32,
    pub to: u32,
    pub meters: f64,
}

/// Decoded snapshot contents. Stop ids are resolved through the blob's own
/// id table, so record order carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub stops: Vec<StopRecord>,
    pub buses: Vec<BusRecord>,
    pub distances: Vec<DistanceRecord>,
    pub render: RenderSettings,
    pub router: RouterSettings,
}

impl Snapshot {
    /// Captures the full reachable state of a finished catalogue.
    pub fn capture(
        catalogue: &Catalogue,
        render: &RenderSettings,
        router: RouterSettings,
    ) -> Self {
        let stops = catalogue
            .stops()
            .map(|(id, stop)| StopRecord {
                id: id.0,
                name: stop.name.clone(),
                coordinates: stop.coordinates,
            })
            .collect();

        let buses = catalogue
            .buses()
            .map(|(_, bus)| BusRecord {
                name: bus.name.clone(),
                is_roundtrip: bus.is_roundtrip,
                stops: bus.stops.iter().map(|s| s.0).collect(),
            })
            .collect();

        let mut distances: Vec<DistanceRecord> = catalogue
            .explicit_distances()
            .map(|(from, to, meters)| DistanceRecord {
                from: from.0,
                to: to.0,
                meters,
            })
            .collect();
        // The distance table is a hash map; sort for a deterministic blob.
        distances.sort_by_key(|d| (d.from, d.to));

        Self {
            stops,
            buses,
            distances,
            render: render.clone(),
            router,
        }
    }

    /// Rebuilds the catalogue and settings. Replays the stored distance
    /// directions as-is, so the reverse-pair fallback behaves identically at
    /// query time.
    pub fn restore(&self) -> Result<(Catalogue, RenderSettings, RouterSettings), SnapshotError> {
        let mut by_blob_id = FxHashMap::default();
        for record in &self.stops {
            by_blob_id.insert(record.id, record);
        }
        let resolve = |id: u32| {
            by_blob_id
                .get(&id)
                .map(|r| r.name.clone())
                .ok_or(SnapshotError::UnknownStopId(id))
        };

        let mut catalogue = Catalogue::new();
        for record in &self.stops {
            catalogue.add_stop(&record.name, record.coordinates)?;
        }
        for record in &self.buses {
            let stop_names = record
                .stops
                .iter()
                .map(|&id| resolve(id))
                .collect::<Result<Vec<_>, _>>()?;
            catalogue.add_bus(&record.name, &stop_names, record.is_roundtrip)?;
        }
        for record in &self.distances {
            let from = catalogue
                .find_stop(&resolve(record.from)?)
                .ok_or(SnapshotError::UnknownStopId(record.from))?;
            let to = catalogue
                .find_stop(&resolve(record.to)?)
                .ok_or(SnapshotError::UnknownStopId(record.to))?;
            catalogue.set_distance(from, to, record.meters);
        }

        Ok((catalogue, self.render.clone(), self.router))
    }
}

pub struct SnapshotFile;

impl SnapshotFile {
    /// Write the snapshot blob. Goes through a sibling temp file and a
    /// rename, so an interrupted build never leaves a half-written snapshot.
    pub fn write<P: AsRef<Path>>(path: P, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let bytes = encode(snapshot);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read and fully validate a snapshot blob.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Snapshot, SnapshotError> {
        let bytes = fs::read(path)?;
        decode(&bytes)
    }
}

fn encode(snapshot: &Snapshot) -> Vec<u8> {
    let mut w = Writer::default();

    w.u32(MAGIC);
    w.u16(VERSION);
    w.u16(0); // reserved
    w.u32(snapshot.stops.len() as u32);
    w.u32(snapshot.buses.len() as u32);
    w.u32(snapshot.distances.len() as u32);

    for stop in &snapshot.stops {
        w.u32(stop.id);
        w.string(&stop.name);
        w.f64(stop.coordinates.lat);
        w.f64(stop.coordinates.lng);
    }

    for bus in &snapshot.buses {
        w.string(&bus.name);
        w.u8(bus.is_roundtrip as u8);
        w.u32(bus.stops.len() as u32);
        for &stop_id in &bus.stops {
            w.u32(stop_id);
        }
    }

    for distance in &snapshot.distances {
        w.u32(distance.from);
        w.u32(distance.to);
        w.f64(distance.meters);
    }

    encode_render(&mut w, &snapshot.render);
    w.f64(snapshot.router.bus_wait_time);
    w.f64(snapshot.router.bus_velocity);

    let footer = crc::checksum(&w.buf);
    w.buf.extend_from_slice(&footer.to_le_bytes());
    w.buf
}

fn encode_render(w: &mut Writer, render: &RenderSettings) {
    w.f64(render.width);
    w.f64(render.height);
    w.f64(render.padding);
    w.f64(render.line_width);
    w.f64(render.stop_radius);
    w.u32(render.bus_label_font_size);
    w.f64(render.bus_label_offset.x);
    w.f64(render.bus_label_offset.y);
    w.u32(render.stop_label_font_size);
    w.f64(render.stop_label_offset.x);
    w.f64(render.stop_label_offset.y);
    encode_color(w, &render.underlayer_color);
    w.f64(render.underlayer_width);
    w.u32(render.color_palette.len() as u32);
    for color in &render.color_palette {
        encode_color(w, color);
    }
}

fn encode_color(w: &mut Writer, color: &Color) {
    match color {
        Color::Name(name) => {
            w.u8(COLOR_NAME);
            w.string(name);
        }
        Color::Rgb { red, green, blue } => {
            w.u8(COLOR_RGB);
            w.u8(*red);
            w.u8(*green);
            w.u8(*blue);
        }
        Color::Rgba {
            red,
            green,
            blue,
            opacity,
        } => {
            w.u8(COLOR_RGBA);
            w.u8(*red);
            w.u8(*green);
            w.u8(*blue);
            w.f64(*opacity);
        }
    }
}

fn decode(bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(SnapshotError::Truncated(bytes.len()));
    }

    let content = &bytes[..bytes.len() - FOOTER_LEN];
    let mut footer = [0u8; FOOTER_LEN];
    footer.copy_from_slice(&bytes[bytes.len() - FOOTER_LEN..]);
    let expected = u64::from_le_bytes(footer);
    let actual = crc::checksum(content);
    if expected != actual {
        return Err(SnapshotError::BadChecksum { expected, actual });
    }

    let mut r = Reader::new(content);

    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(SnapshotError::BadMagic(magic));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(SnapshotError::BadVersion(version));
    }
    r.u16()?; // reserved
    let stop_count = r.u32()? as usize;
    let bus_count = r.u32()? as usize;
    let distance_count = r.u32()? as usize;

    let mut stops = Vec::with_capacity(stop_count);
    for _ in 0..stop_count {
        let id = r.u32()?;
        let name = r.string()?;
        let lat = r.f64()?;
        let lng = r.f64()?;
        stops.push(StopRecord {
            id,
            name,
            coordinates: Coordinates { lat, lng },
        });
    }

    let mut buses = Vec::with_capacity(bus_count);
    for _ in 0..bus_count {
        let name = r.string()?;
        let is_roundtrip = r.u8()? != 0;
        let n_stops = r.u32()? as usize;
        let mut bus_stops = Vec::with_capacity(n_stops);
        for _ in 0..n_stops {
            bus_stops.push(r.u32()?);
        }
        buses.push(BusRecord {
            name,
            is_roundtrip,
            stops: bus_stops,
        });
    }

    let mut distances = Vec::with_capacity(distance_count);
    for _ in 0..distance_count {
        let from = r.u32()?;
        let to = r.u32()?;
        let meters = r.f64()?;
        distances.push(DistanceRecord { from, to, meters });
    }

    let render = decode_render(&mut r)?;
    let router = RouterSettings {
        bus_wait_time: r.f64()?,
        bus_velocity: r.f64()?,
    };

    if !r.is_empty() {
        return Err(SnapshotError::TrailingBytes(r.pos()));
    }

    Ok(Snapshot {
        stops,
        buses,
        distances,
        render,
        router,
    })
}

fn decode_render(r: &mut Reader) -> Result<RenderSettings, SnapshotError> {
    let width = r.f64()?;
    let height = r.f64()?;
    let padding = r.f64()?;
    let line_width = r.f64()?;
    let stop_radius = r.f64()?;
    let bus_label_font_size = r.u32()?;
    let bus_label_offset = Point {
        x: r.f64()?,
        y: r.f64()?,
    };
    let stop_label_font_size = r.u32()?;
    let stop_label_offset = Point {
        x: r.f64()?,
        y: r.f64()?,
    };
    let underlayer_color = decode_color(r)?;
    let underlayer_width = r.f64()?;
    let palette_len = r.u32()? as usize;
    let mut color_palette = Vec::with_capacity(palette_len);
    for _ in 0..palette_len {
        color_palette.push(decode_color(r)?);
    }

    Ok(RenderSettings {
        width,
        height,
        padding,
        line_width,
        stop_radius,
        bus_label_font_size,
        bus_label_offset,
        stop_label_font_size,
        stop_label_offset,
        underlayer_color,
        underlayer_width,
        color_palette,
    })
}

fn decode_color(r: &mut Reader) -> Result<Color, SnapshotError> {
    match r.u8()? {
        COLOR_NAME => Ok(Color::Name(r.string()?)),
        COLOR_RGB => Ok(Color::Rgb {
            red: r.u8()?,
            green: r.u8()?,
            blue: r.u8()?,
        }),
        COLOR_RGBA => Ok(Color::Rgba {
            red: r.u8()?,
            green: r.u8()?,
            blue: r.u8()?,
            opacity: r.f64()?,
        }),
        tag => Err(SnapshotError::BadColorTag(tag)),
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.buf.len() - self.pos < n {
            return Err(SnapshotError::Truncated(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, SnapshotError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, SnapshotError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String, SnapshotError> {
        let at = self.pos;
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SnapshotError::BadString(at))
    }
}
