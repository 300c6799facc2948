use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One of the three principal axes of a volume. `X` indexes the first array
/// axis, which is the slice order for volumes loaded from a directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Position of this axis in the `[x, y, z]` array shape.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        })
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("unknown axis '{other}', expected x, y or z")),
        }
    }
}

/// Named colour scale shared by heatmaps and the 3D renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    #[default]
    Rainbow,
    Viridis,
    Gray,
    Jet,
}

impl Colormap {
    pub const ALL: [Colormap; 4] = [
        Colormap::Rainbow,
        Colormap::Viridis,
        Colormap::Gray,
        Colormap::Jet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Colormap::Rainbow => "rainbow",
            Colormap::Viridis => "viridis",
            Colormap::Gray => "gray",
            Colormap::Jet => "jet",
        }
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Colormap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "grey" | "greys" | "grays" => return Ok(Colormap::Gray),
            _ => {}
        }
        Colormap::ALL
            .into_iter()
            .find(|c| c.name() == lower)
            .ok_or_else(|| format!("unknown colormap '{s}'"))
    }
}

/// Direction in which the stitcher advances its cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StitchMode {
    /// Canvas width is the widest tile, heights add up.
    #[default]
    Vertical,
    /// Canvas height is the tallest tile, widths add up.
    Horizontal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportKind {
    /// The three axis montages stacked vertically.
    #[serde(rename = "2d")]
    TwoD,
    /// The three camera presets side by side.
    #[serde(rename = "3d")]
    ThreeD,
    /// Montages stacked, followed by the row of 3D renderings.
    #[default]
    #[serde(rename = "all")]
    All,
}

impl ExportKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ExportKind::TwoD => "volume_summary_2d.png",
            ExportKind::ThreeD => "volume_summary_3d.png",
            ExportKind::All => "volume_summary.png",
        }
    }
}

impl FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "2d" => Ok(ExportKind::TwoD),
            "3d" => Ok(ExportKind::ThreeD),
            "all" => Ok(ExportKind::All),
            other => Err(format!("unknown export kind '{other}', expected 2d, 3d or all")),
        }
    }
}
