//! Map appearance settings.
//!
//! The drawing layer is an external collaborator; the core only parses these
//! settings from the request tree, carries them through the snapshot, and
//! hands them back untouched.

#[derive(Debug, Clone, PartialEq)]
pub enum Color {
    Name(String),
    Rgb { red: u8, green: u8, blue: u8 },
    Rgba { red: u8, green: u8, blue: u8, opacity: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub width: f64,
    pub height: f64,
    pub padding: f64,
    pub line_width: f64,
    pub stop_radius: f64,
    pub bus_label_font_size: u32,
    pub bus_label_offset: Point,
    pub stop_label_font_size: u32,
    pub stop_label_offset: Point,
    pub underlayer_color: Color,
    pub underlayer_width: f64,
    pub color_palette: Vec<Color>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 1200.0,
            padding: 50.0,
            line_width: 14.0,
            stop_radius: 5.0,
            bus_label_font_size: 20,
            bus_label_offset: Point { x: 7.0, y: 15.0 },
            stop_label_font_size: 20,
            stop_label_offset: Point { x: 7.0, y: -3.0 },
            underlayer_color: Color::Rgba {
                red: 255,
                green: 255,
                blue: 255,
                opacity: 0.85,
            },
            underlayer_width: 3.0,
            color_palette: vec![
                Color::Name("green".to_string()),
                Color::Rgb {
                    red: 255,
                    green: 160,
                    blue: 0,
                },
                Color::Name("red".to_string()),
            ],
        }
    }
}
