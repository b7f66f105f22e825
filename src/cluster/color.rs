//! Display colors for clusters

use std::fmt;
use std::str::FromStr;
use crate::error::Error;

/// 8-bit RGB color, written as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Convert hue/saturation/brightness (each in `[0, 1]`, hue wraps) to RGB
    pub fn from_hsb(hue: f32, saturation: f32, brightness: f32) -> Self {
        let channel = |v: f32| (v * 255.0 + 0.5) as u8;

        if saturation == 0.0 {
            let v = channel(brightness);
            return Self::new(v, v, v);
        }

        let h = (hue - hue.floor()) * 6.0;
        let f = h - h.floor();
        let p = brightness * (1.0 - saturation);
        let q = brightness * (1.0 - saturation * f);
        let t = brightness * (1.0 - saturation * (1.0 - f));

        let (r, g, b) = match h as u32 {
            0 => (brightness, t, p),
            1 => (q, brightness, p),
            2 => (p, brightness, t),
            3 => (p, q, brightness),
            4 => (t, p, brightness),
            _ => (brightness, p, q),
        };
        Self::new(channel(r), channel(g), channel(b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::corrupt(format!("invalid color '{}'", s));
        if s.len() != 7 || !s.starts_with('#') {
            return Err(bad());
        }
        let component = |range: std::ops::Range<usize>| {
            s.get(range).and_then(|hex| u8::from_str_radix(hex, 16).ok()).ok_or_else(bad)
        };
        Ok(Self::new(component(1..3)?, component(3..5)?, component(5..7)?))
    }
}

/// Evenly spaced hues handed out from the end of the palette downwards.
///
/// The hue walk visits 0 and 0.5 first, then fills the gaps between the
/// hues already used, halving the separation every round.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<Color>,
    next: usize,
}

impl Palette {
    pub fn new(count: usize) -> Self {
        let mut colors = Vec::with_capacity(count);
        let mut hues = vec![0.0f32, 0.5];
        let mut colors_in_round = 2;
        let mut offset = -0.25f32;
        let mut separation = 0.5f32;

        while hues.len() < count {
            let mut h = offset;
            for _ in 0..colors_in_round {
                hues.push(h);
                h += separation;
            }
            colors_in_round *= 2;
            offset /= 2.0;
            separation /= 2.0;
        }

        colors.extend(hues.into_iter().take(count).map(|h| Color::from_hsb(h, 1.0, 1.0)));
        Self { colors, next: count }
    }

    /// Next unused color, wrapping around once the palette is exhausted
    pub fn next_color(&mut self) -> Color {
        if self.colors.is_empty() {
            return Color::default();
        }
        if self.next == 0 {
            self.next = self.colors.len();
        }
        self.next -= 1;
        self.colors[self.next]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_starts_with_opposite_hues() {
        let mut palette = Palette::new(4);
        let colors: Vec<String> = (0..4).map(|_| palette.next_color().to_string()).collect();
        // handed out in reverse: 0.25, -0.25 (= 0.75), 0.5, 0.0
        assert_eq!(colors, vec!["#80ff00", "#8000ff", "#00ffff", "#ff0000"]);
        // exhausted palettes wrap around
        assert_eq!(palette.next_color().to_string(), "#80ff00");
    }

    #[test]
    fn palette_colors_are_distinct() {
        let palette = Palette::new(64);
        let unique: std::collections::HashSet<_> = palette.colors.iter().collect();
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn html_form_parses_back() {
        let color: Color = "#1a2b3c".parse().unwrap();
        assert_eq!(color, Color::new(0x1a, 0x2b, 0x3c));
        assert!("1a2b3c".parse::<Color>().is_err());
        assert!("#zz0000".parse::<Color>().is_err());
    }
}
