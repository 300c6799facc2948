//! Reading and writing 3D arrays in the NumPy `.npy` format.
//!
//! Only what a volume needs is supported: three dimensions, numeric
//! scalar dtypes, C or Fortran order. Everything is converted to `f32`
//! on load; saving always writes little-endian `f32` in C order, so a
//! save followed by a load reproduces the array bit for bit.

use half::f16;
use ndarray::Array3;
use ndarray::ShapeBuilder;
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("Not an npy file (bad magic)")]
    BadMagic,

    #[error("Unsupported npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("Malformed npy header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported dtype '{0}'")]
    UnsupportedDtype(String),

    #[error("Expected a 3D array, found shape {0:?}")]
    NotThreeDimensional(Vec<usize>),

    #[error("Data holds {actual} bytes, shape requires {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Float,
    Unsigned,
    Signed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Dtype {
    big_endian: bool,
    kind: Kind,
    size: usize,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        let unsupported = || NpyError::UnsupportedDtype(descr.to_string());
        let mut chars = descr.chars();
        let order = chars.next().ok_or_else(unsupported)?;
        let big_endian = match order {
            '<' | '|' => false,
            '>' => true,
            '=' => cfg!(target_endian = "big"),
            _ => return Err(unsupported()),
        };
        let kind = match chars.next() {
            Some('f') => Kind::Float,
            Some('u') => Kind::Unsigned,
            Some('i') => Kind::Signed,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;
        let dtype = Self {
            big_endian,
            kind,
            size,
        };
        match (kind, size) {
            (Kind::Float, 2 | 4 | 8) | (Kind::Unsigned, 1 | 2 | 4) | (Kind::Signed, 1 | 2 | 4) => {
                Ok(dtype)
            }
            _ => Err(unsupported()),
        }
    }

    fn needs_swap(&self) -> bool {
        self.size > 1 && self.big_endian != cfg!(target_endian = "big")
    }
}

#[derive(Debug, PartialEq)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn dict_value<'a>(dict: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let quoted = format!("'{key}'");
    let start = dict
        .find(&quoted)
        .ok_or_else(|| NpyError::MalformedHeader(format!("missing key {key}")))?;
    let rest = &dict[start + quoted.len()..];
    let colon = rest
        .find(':')
        .ok_or_else(|| NpyError::MalformedHeader(format!("no value for {key}")))?;
    Ok(rest[colon + 1..].trim_start())
}

fn parse_header(dict: &str) -> Result<Header, NpyError> {
    let descr_value = dict_value(dict, "descr")?;
    let descr = descr_value
        .strip_prefix('\'')
        .and_then(|s| s.split('\'').next())
        .ok_or_else(|| NpyError::MalformedHeader("descr is not a string".into()))?;

    let fortran_value = dict_value(dict, "fortran_order")?;
    let fortran_order = if fortran_value.starts_with("True") {
        true
    } else if fortran_value.starts_with("False") {
        false
    } else {
        return Err(NpyError::MalformedHeader("fortran_order is not a bool".into()));
    };

    let shape_value = dict_value(dict, "shape")?;
    let tuple = shape_value
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| NpyError::MalformedHeader("shape is not a tuple".into()))?;
    let shape = tuple
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| NpyError::MalformedHeader(format!("bad dimension '{s}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        dtype: Dtype::parse(descr)?,
        fortran_order,
        shape,
    })
}

fn decode_samples(dtype: Dtype, raw: &[u8]) -> Vec<f32> {
    let mut bytes = raw.to_vec();
    if dtype.needs_swap() {
        bytes
            .chunks_exact_mut(dtype.size)
            .for_each(|sample| sample.reverse());
    }
    match (dtype.kind, dtype.size) {
        (Kind::Float, 2) => bytemuck::pod_collect_to_vec::<u8, f16>(&bytes)
            .into_iter()
            .map(f16::to_f32)
            .collect(),
        (Kind::Float, 4) => bytemuck::pod_collect_to_vec::<u8, f32>(&bytes),
        (Kind::Float, _) => bytemuck::pod_collect_to_vec::<u8, f64>(&bytes)
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        (Kind::Unsigned, 1) => bytes.iter().map(|&v| v as f32).collect(),
        (Kind::Unsigned, 2) => bytemuck::pod_collect_to_vec::<u8, u16>(&bytes)
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        (Kind::Unsigned, _) => bytemuck::pod_collect_to_vec::<u8, u32>(&bytes)
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        (Kind::Signed, 1) => bytes.iter().map(|&v| v as i8 as f32).collect(),
        (Kind::Signed, 2) => bytemuck::pod_collect_to_vec::<u8, i16>(&bytes)
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        (Kind::Signed, _) => bytemuck::pod_collect_to_vec::<u8, i32>(&bytes)
            .into_iter()
            .map(|v| v as f32)
            .collect(),
    }
}

/// Parse an in-memory `.npy` file into a 3D `f32` array.
pub fn from_bytes(bytes: &[u8]) -> Result<Array3<f32>, NpyError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(NpyError::BadMagic);
    }
    let (major, minor) = (bytes[6], bytes[7]);
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(NpyError::BadMagic);
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };
    let data_start = header_start + header_len;
    let header_bytes = bytes
        .get(header_start..data_start)
        .ok_or_else(|| NpyError::MalformedHeader("header runs past end of file".into()))?;
    let dict = std::str::from_utf8(header_bytes)
        .map_err(|_| NpyError::MalformedHeader("header is not utf-8".into()))?;
    let header = parse_header(dict)?;

    let shape: [usize; 3] = header
        .shape
        .as_slice()
        .try_into()
        .map_err(|_| NpyError::NotThreeDimensional(header.shape.clone()))?;
    let expected = shape
        .iter()
        .try_fold(header.dtype.size, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| NpyError::MalformedHeader(format!("shape {shape:?} is too large")))?;
    let data = &bytes[data_start..];
    if data.len() < expected {
        return Err(NpyError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    let samples = decode_samples(header.dtype, &data[..expected]);

    let dims = (shape[0], shape[1], shape[2]);
    let array = if header.fortran_order {
        Array3::from_shape_vec(dims.f(), samples)
    } else {
        Array3::from_shape_vec(dims, samples)
    }
    .map_err(|e| NpyError::MalformedHeader(e.to_string()))?;
    Ok(array.as_standard_layout().into_owned())
}

pub fn read(path: &Path) -> Result<Array3<f32>, NpyError> {
    from_bytes(&fs::read(path)?)
}

/// Encode `array` as a version 1.0 `.npy` file with dtype `<f4`.
pub fn to_bytes(array: &Array3<f32>) -> Vec<u8> {
    let (x, y, z) = array.dim();
    let dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({x}, {y}, {z}), }}");
    // Magic, version and length prefix take 10 bytes; the header ends with
    // a newline and the whole preamble is padded to a multiple of 64.
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    let header = format!("{dict}{}\n", " ".repeat(pad));

    let standard = array.as_standard_layout();
    let samples = standard.as_slice().unwrap_or_default();

    let mut out = Vec::with_capacity(10 + header.len() + samples.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    if cfg!(target_endian = "little") {
        out.extend_from_slice(bytemuck::cast_slice(samples));
    } else {
        samples
            .iter()
            .for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
    }
    out
}

pub fn write(array: &Array3<f32>, path: &Path) -> Result<(), NpyError> {
    let mut file = fs::File::create(path)?;
    file.write_all(&to_bytes(array))?;
    Ok(())
}
