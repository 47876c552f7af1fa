//! NIfTI-1 label volume support
//!
//! Single-file images (`n+1`), raw or gzip compressed. The reader decodes
//! the first 3D frame into a [`LabelVolume`] whose voxel `(i, j, k)` sits at
//! `(i, j, k) * spacing`; the header's voxel-to-world mapping is exposed
//! through [`NiftiHeader::voxel_to_world`] but not applied to the grid.

use crate::error::IoError;
use crate::VolumeReader;
use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use labelmesh_core::{LabelVolume, Matrix4, Point3f, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Size of a NIfTI-1 header
pub const NIFTI1_HEADER_SIZE: usize = 348;
const NIFTI2_HEADER_SIZE: i32 = 540;
/// Header plus the four extension flag bytes
const NIFTI1_DATA_OFFSET: usize = 352;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Voxel storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiDatatype {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

impl NiftiDatatype {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            2 => Some(Self::UInt8),
            4 => Some(Self::Int16),
            8 => Some(Self::Int32),
            16 => Some(Self::Float32),
            64 => Some(Self::Float64),
            256 => Some(Self::Int8),
            512 => Some(Self::UInt16),
            768 => Some(Self::UInt32),
            1024 => Some(Self::Int64),
            1280 => Some(Self::UInt64),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::UInt8 => 2,
            Self::Int16 => 4,
            Self::Int32 => 8,
            Self::Float32 => 16,
            Self::Float64 => 64,
            Self::Int8 => 256,
            Self::UInt16 => 512,
            Self::UInt32 => 768,
            Self::Int64 => 1024,
            Self::UInt64 => 1280,
        }
    }

    pub fn bytes_per_voxel(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::UInt64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

/// The decoded fields of a NIfTI-1 header that matter for label volumes
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub little_endian: bool,
    pub dim: [i16; 8],
    pub datatype: i16,
    pub bitpix: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub qform_code: i16,
    pub sform_code: i16,
    pub quatern: [f32; 3],
    pub qoffset: [f32; 3],
    pub srow_x: [f32; 4],
    pub srow_y: [f32; 4],
    pub srow_z: [f32; 4],
    pub magic: [u8; 4],
}

impl NiftiHeader {
    /// Parse the first 348 bytes of a NIfTI-1 file
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, IoError> {
        if bytes.len() < NIFTI1_HEADER_SIZE {
            return Err(IoError::ParseError {
                message: format!("NIfTI header needs {} bytes, got {}", NIFTI1_HEADER_SIZE, bytes.len()),
            });
        }

        let header = if LittleEndian::read_i32(bytes) == NIFTI1_HEADER_SIZE as i32 {
            parse_fields::<LittleEndian>(bytes, true)
        } else if BigEndian::read_i32(bytes) == NIFTI1_HEADER_SIZE as i32 {
            parse_fields::<BigEndian>(bytes, false)
        } else if LittleEndian::read_i32(bytes) == NIFTI2_HEADER_SIZE
            || BigEndian::read_i32(bytes) == NIFTI2_HEADER_SIZE
        {
            return Err(IoError::UnsupportedFormat {
                format: "NIfTI-2".to_string(),
            });
        } else {
            return Err(IoError::InvalidFormat {
                format: "not a NIfTI-1 header (sizeof_hdr != 348)".to_string(),
            });
        };

        match &header.magic {
            b"n+1\0" => Ok(header),
            b"ni1\0" => Err(IoError::UnsupportedFormat {
                format: "NIfTI-1 header/image pair (.hdr/.img)".to_string(),
            }),
            other => Err(IoError::InvalidFormat {
                format: format!("bad NIfTI magic {:?}", other),
            }),
        }
    }

    /// Grid dimensions of the first 3D frame
    pub fn dimensions(&self) -> std::result::Result<[usize; 3], IoError> {
        let rank = self.dim[0];
        if !(3..=7).contains(&rank) {
            return Err(IoError::InvalidFormat {
                format: format!("expected a 3D image, dim[0] = {}", rank),
            });
        }
        let mut dims = [0usize; 3];
        for (axis, size) in dims.iter_mut().enumerate() {
            let d = self.dim[axis + 1];
            if d <= 0 {
                return Err(IoError::InvalidFormat {
                    format: format!("dim[{}] = {}", axis + 1, d),
                });
            }
            *size = d as usize;
        }
        Ok(dims)
    }

    /// Voxel spacing from `pixdim[1..=3]`; zero spacing becomes 1
    pub fn spacing(&self) -> [f32; 3] {
        [1, 2, 3].map(|i| {
            let s = self.pixdim[i].abs();
            if s > 0.0 && s.is_finite() {
                s
            } else {
                1.0
            }
        })
    }

    /// Whether stored values are rescaled before use
    pub fn has_scaling(&self) -> bool {
        self.scl_slope != 0.0 && self.scl_slope.is_finite() && !(self.scl_slope == 1.0 && self.scl_inter == 0.0)
    }

    /// Voxel-to-world matrix: sform if present, otherwise qform, otherwise
    /// plain spacing.
    pub fn voxel_to_world(&self) -> Matrix4<f32> {
        if self.sform_code > 0 {
            return Matrix4::new(
                self.srow_x[0], self.srow_x[1], self.srow_x[2], self.srow_x[3],
                self.srow_y[0], self.srow_y[1], self.srow_y[2], self.srow_y[3],
                self.srow_z[0], self.srow_z[1], self.srow_z[2], self.srow_z[3],
                0.0, 0.0, 0.0, 1.0,
            );
        }
        let [dx, dy, dz] = self.spacing();
        if self.qform_code <= 0 {
            return Matrix4::new_nonuniform_scaling(&labelmesh_core::Vector3::new(dx, dy, dz));
        }

        let [b, c, d] = self.quatern;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;
        let [ox, oy, oz] = self.qoffset;
        Matrix4::new(
            (a * a + b * b - c * c - d * d) * dx,
            2.0 * (b * c - a * d) * dy,
            2.0 * (b * d + a * c) * dz,
            ox,
            2.0 * (b * c + a * d) * dx,
            (a * a + c * c - b * b - d * d) * dy,
            2.0 * (c * d - a * b) * dz,
            oy,
            2.0 * (b * d - a * c) * dx,
            2.0 * (c * d + a * b) * dy,
            (a * a + d * d - c * c - b * b) * dz,
            oz,
            0.0,
            0.0,
            0.0,
            1.0,
        )
    }
}

fn parse_fields<B: ByteOrder>(bytes: &[u8], little_endian: bool) -> NiftiHeader {
    let i16_at = |offset: usize| B::read_i16(&bytes[offset..]);
    let f32_at = |offset: usize| B::read_f32(&bytes[offset..]);
    let row = |offset: usize| [0, 1, 2, 3].map(|i| f32_at(offset + 4 * i));

    NiftiHeader {
        little_endian,
        dim: std::array::from_fn(|i| i16_at(40 + 2 * i)),
        datatype: i16_at(70),
        bitpix: i16_at(72),
        pixdim: std::array::from_fn(|i| f32_at(76 + 4 * i)),
        vox_offset: f32_at(108),
        scl_slope: f32_at(112),
        scl_inter: f32_at(116),
        qform_code: i16_at(252),
        sform_code: i16_at(254),
        quatern: [f32_at(256), f32_at(260), f32_at(264)],
        qoffset: [f32_at(268), f32_at(272), f32_at(276)],
        srow_x: row(280),
        srow_y: row(296),
        srow_z: row(312),
        magic: [bytes[344], bytes[345], bytes[346], bytes[347]],
    }
}

/// NIfTI-1 label volume reader
pub struct NiftiReader;

impl NiftiReader {
    /// Read the file, inflating it if it starts with the gzip magic
    fn read_bytes(path: &Path) -> std::result::Result<Vec<u8>, IoError> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => IoError::Io(e),
        })?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        decompress(raw)
    }

    /// Decode only the header
    pub fn read_header<P: AsRef<Path>>(path: P) -> Result<NiftiHeader> {
        let bytes = Self::read_bytes(path.as_ref())?;
        Ok(NiftiHeader::parse(&bytes)?)
    }

    /// Decode the header and the first 3D frame
    pub fn read_volume_with_header<P: AsRef<Path>>(path: P) -> Result<(NiftiHeader, LabelVolume)> {
        let path = path.as_ref();
        let bytes = Self::read_bytes(path)?;
        let (header, volume) = Self::decode(&bytes)?;
        log::debug!(
            "Read NIfTI {}: dims {:?}, spacing {:?}, datatype {}",
            path.display(),
            volume.dimensions(),
            volume.spacing(),
            header.datatype
        );
        Ok((header, volume))
    }

    /// Decode an in-memory image, raw or gzip compressed
    pub fn read_volume_from_bytes(bytes: &[u8]) -> Result<LabelVolume> {
        let bytes = decompress(bytes.to_vec())?;
        Ok(Self::decode(&bytes)?.1)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<(NiftiHeader, LabelVolume), IoError> {
        let header = NiftiHeader::parse(bytes)?;
        let dims = header.dimensions()?;
        let datatype = NiftiDatatype::from_code(header.datatype).ok_or_else(|| IoError::UnsupportedFormat {
            format: format!("NIfTI datatype {}", header.datatype),
        })?;

        let count = dims[0] * dims[1] * dims[2];
        let offset = if header.vox_offset >= NIFTI1_HEADER_SIZE as f32 {
            header.vox_offset as usize
        } else {
            NIFTI1_DATA_OFFSET
        };
        let needed = count * datatype.bytes_per_voxel();
        let payload = bytes
            .get(offset..)
            .filter(|payload| payload.len() >= needed)
            .ok_or_else(|| IoError::ParseError {
                message: format!(
                    "truncated NIfTI payload: need {} bytes from offset {}, file has {}",
                    needed,
                    offset,
                    bytes.len()
                ),
            })?;

        let scaling = header.has_scaling().then_some((header.scl_slope as f64, header.scl_inter as f64));
        let samples = if header.little_endian {
            decode_samples::<LittleEndian>(payload, datatype, count, scaling)
        } else {
            decode_samples::<BigEndian>(payload, datatype, count, scaling)
        };

        let volume = LabelVolume::from_x_fastest(dims, samples, header.spacing(), Point3f::origin())
            .map_err(|e| IoError::ParseError { message: e.to_string() })?;
        Ok((header, volume))
    }
}

impl VolumeReader for NiftiReader {
    fn read_volume<P: AsRef<Path>>(path: P) -> Result<LabelVolume> {
        Ok(Self::read_volume_with_header(path)?.1)
    }
}

fn decompress(raw: Vec<u8>) -> std::result::Result<Vec<u8>, IoError> {
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(raw);
    }
    let mut inflated = Vec::new();
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| IoError::ParseError {
            message: format!("corrupt gzip stream: {}", e),
        })?;
    Ok(inflated)
}

/// Convert stored samples to labels, rescaling and rounding where needed
fn decode_samples<B: ByteOrder>(
    payload: &[u8],
    datatype: NiftiDatatype,
    count: usize,
    scaling: Option<(f64, f64)>,
) -> Vec<i32> {
    let width = datatype.bytes_per_voxel();
    let raw = |i: usize| -> f64 {
        let b = &payload[i * width..];
        match datatype {
            NiftiDatatype::UInt8 => b[0] as f64,
            NiftiDatatype::Int8 => b[0] as i8 as f64,
            NiftiDatatype::UInt16 => B::read_u16(b) as f64,
            NiftiDatatype::Int16 => B::read_i16(b) as f64,
            NiftiDatatype::UInt32 => B::read_u32(b) as f64,
            NiftiDatatype::Int32 => B::read_i32(b) as f64,
            NiftiDatatype::UInt64 => B::read_u64(b) as f64,
            NiftiDatatype::Int64 => B::read_i64(b) as f64,
            NiftiDatatype::Float32 => B::read_f32(b) as f64,
            NiftiDatatype::Float64 => B::read_f64(b),
        }
    };

    (0..count)
        .map(|i| {
            let value = match scaling {
                Some((slope, inter)) => raw(i) * slope + inter,
                None => raw(i),
            };
            // `as` saturates; NaN becomes background
            value.round() as i32
        })
        .collect()
}

/// NIfTI-1 label volume writer; gzip compresses when the path ends in `.gz`
#[derive(Debug, Clone, Copy)]
pub struct NiftiWriter {
    pub datatype: NiftiDatatype,
    pub big_endian: bool,
}

impl Default for NiftiWriter {
    fn default() -> Self {
        Self::new(NiftiDatatype::Int16)
    }
}

impl NiftiWriter {
    pub fn new(datatype: NiftiDatatype) -> Self {
        Self {
            datatype,
            big_endian: false,
        }
    }

    pub fn with_big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn write_volume<P: AsRef<Path>>(&self, volume: &LabelVolume, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode(volume)?;
        let writer = BufWriter::new(File::create(path)?);
        let gzip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

        if gzip {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Serialize header and voxels of an uncompressed `.nii`
    pub fn encode(&self, volume: &LabelVolume) -> Result<Vec<u8>> {
        if self.big_endian {
            encode_image::<BigEndian>(volume, self.datatype)
        } else {
            encode_image::<LittleEndian>(volume, self.datatype)
        }
    }
}

fn encode_image<B: ByteOrder>(volume: &LabelVolume, datatype: NiftiDatatype) -> Result<Vec<u8>> {
    let dims = volume.dimensions();
    if dims.iter().any(|&d| d == 0 || d > i16::MAX as usize) {
        return Err(IoError::WriteError {
            message: format!("dimensions {:?} do not fit a NIfTI-1 header", dims),
        }
        .into());
    }
    let spacing = volume.spacing();
    let origin = volume.origin();

    let mut out = Vec::with_capacity(NIFTI1_DATA_OFFSET + volume.len() * datatype.bytes_per_voxel());
    out.write_i32::<B>(NIFTI1_HEADER_SIZE as i32)?;
    // data_type, db_name, extents, session_error, regular, dim_info
    out.write_all(&[0u8; 36])?;
    for d in [3, dims[0] as i16, dims[1] as i16, dims[2] as i16, 1, 1, 1, 1] {
        out.write_i16::<B>(d)?;
    }
    // intent_p1..3, intent_code
    out.write_all(&[0u8; 14])?;
    out.write_i16::<B>(datatype.code())?;
    out.write_i16::<B>((datatype.bytes_per_voxel() * 8) as i16)?;
    out.write_i16::<B>(0)?;
    for p in [1.0, spacing[0], spacing[1], spacing[2], 1.0, 1.0, 1.0, 1.0] {
        out.write_f32::<B>(p)?;
    }
    out.write_f32::<B>(NIFTI1_DATA_OFFSET as f32)?;
    out.write_f32::<B>(1.0)?;
    out.write_f32::<B>(0.0)?;
    out.write_i16::<B>(0)?;
    out.write_u8(0)?;
    // xyzt_units: millimetres
    out.write_u8(2)?;
    // cal_max, cal_min, slice_duration, toffset, glmax, glmin, descrip, aux_file
    out.write_all(&[0u8; 128])?;
    out.write_i16::<B>(0)?;
    out.write_i16::<B>(1)?;
    for q in [0.0, 0.0, 0.0, origin.x, origin.y, origin.z] {
        out.write_f32::<B>(q)?;
    }
    for axis in 0..3 {
        let mut row = [0.0f32; 4];
        row[axis] = spacing[axis];
        row[3] = origin[axis];
        for value in row {
            out.write_f32::<B>(value)?;
        }
    }
    out.write_all(&[0u8; 16])?;
    out.write_all(b"n+1\0")?;
    out.write_all(&[0u8; 4])?;
    debug_assert_eq!(out.len(), NIFTI1_DATA_OFFSET);

    let labels = volume.labels();
    for z in 0..dims[2] {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                write_sample::<B>(&mut out, datatype, labels[[x, y, z]])?;
            }
        }
    }
    Ok(out)
}

fn write_sample<B: ByteOrder>(out: &mut Vec<u8>, datatype: NiftiDatatype, label: i32) -> Result<()> {
    let out_of_range = || IoError::WriteError {
        message: format!("label {} does not fit datatype {:?}", label, datatype),
    };
    match datatype {
        NiftiDatatype::UInt8 => out.write_u8(u8::try_from(label).map_err(|_| out_of_range())?)?,
        NiftiDatatype::Int8 => out.write_i8(i8::try_from(label).map_err(|_| out_of_range())?)?,
        NiftiDatatype::UInt16 => out.write_u16::<B>(u16::try_from(label).map_err(|_| out_of_range())?)?,
        NiftiDatatype::Int16 => out.write_i16::<B>(i16::try_from(label).map_err(|_| out_of_range())?)?,
        NiftiDatatype::UInt32 => out.write_u32::<B>(u32::try_from(label).map_err(|_| out_of_range())?)?,
        NiftiDatatype::Int32 => out.write_i32::<B>(label)?,
        NiftiDatatype::UInt64 => out.write_u64::<B>(u64::try_from(label).map_err(|_| out_of_range())?)?,
        NiftiDatatype::Int64 => out.write_i64::<B>(label as i64)?,
        NiftiDatatype::Float32 => out.write_f32::<B>(label as f32)?,
        NiftiDatatype::Float64 => out.write_f64::<B>(label as f64)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("labelmesh_nifti_{}_{}", std::process::id(), name))
    }

    fn sample_volume() -> LabelVolume {
        let mut volume = LabelVolume::new([4, 3, 2], [0.5, 0.75, 2.0], Point3f::origin());
        volume.set(1, 1, 0, 4).unwrap();
        volume.set(3, 2, 1, 17).unwrap();
        volume.set(0, 2, 1, 1).unwrap();
        volume
    }

    #[test]
    fn test_datatype_codes() {
        for code in [2, 4, 8, 16, 64, 256, 512, 768, 1024, 1280] {
            let datatype = NiftiDatatype::from_code(code).unwrap();
            assert_eq!(datatype.code(), code);
        }
        assert_eq!(NiftiDatatype::from_code(128), None);
        assert_eq!(NiftiDatatype::Float64.bytes_per_voxel(), 8);
    }

    #[test]
    fn test_write_read_nii() {
        let path = temp_path("plain.nii");
        let volume = sample_volume();
        NiftiWriter::default().write_volume(&volume, &path).unwrap();

        let (header, loaded) = NiftiReader::read_volume_with_header(&path).unwrap();
        assert!(header.little_endian);
        assert_eq!(header.datatype, 4);
        assert_eq!(loaded.dimensions(), [4, 3, 2]);
        assert_eq!(loaded.spacing(), [0.5, 0.75, 2.0]);
        assert_eq!(loaded.labels(), volume.labels());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_read_nii_gz() {
        let path = temp_path("compressed.nii.gz");
        let volume = sample_volume();
        NiftiWriter::new(NiftiDatatype::Int32).write_volume(&volume, &path).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &GZIP_MAGIC);

        let loaded = NiftiReader::read_volume(&path).unwrap();
        assert_eq!(loaded.labels(), volume.labels());
        assert_eq!(loaded.get(3, 2, 1), Some(17));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_big_endian_header() {
        let volume = sample_volume();
        let bytes = NiftiWriter::new(NiftiDatatype::UInt16)
            .with_big_endian(true)
            .encode(&volume)
            .unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 1, 92]);

        let header = NiftiHeader::parse(&bytes).unwrap();
        assert!(!header.little_endian);
        let loaded = NiftiReader::read_volume_from_bytes(&bytes).unwrap();
        assert_eq!(loaded.labels(), volume.labels());
    }

    #[test]
    fn test_float_samples_are_scaled_and_rounded() {
        let volume = sample_volume();
        let mut bytes = NiftiWriter::new(NiftiDatatype::Float32).encode(&volume).unwrap();
        // scl_slope = 2, scl_inter = 0.4: 4 -> 8.4 -> 8
        bytes[112..116].copy_from_slice(&2.0f32.to_le_bytes());
        bytes[116..120].copy_from_slice(&0.4f32.to_le_bytes());

        let loaded = NiftiReader::read_volume_from_bytes(&bytes).unwrap();
        assert_eq!(loaded.get(1, 1, 0), Some(8));
        assert_eq!(loaded.get(3, 2, 1), Some(34));
        assert_eq!(loaded.get(0, 0, 0), Some(0));
    }

    #[test]
    fn test_zero_spacing_falls_back_to_one() {
        let volume = sample_volume();
        let mut bytes = NiftiWriter::default().encode(&volume).unwrap();
        bytes[80..84].copy_from_slice(&0.0f32.to_le_bytes());
        bytes[84..88].copy_from_slice(&(-3.0f32).to_le_bytes());

        let loaded = NiftiReader::read_volume_from_bytes(&bytes).unwrap();
        assert_eq!(loaded.spacing(), [1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_voxel_to_world_uses_sform() {
        let volume = LabelVolume::new([2, 2, 2], [2.0, 3.0, 4.0], Point3f::new(10.0, 20.0, 30.0));
        let bytes = NiftiWriter::default().encode(&volume).unwrap();
        let header = NiftiHeader::parse(&bytes).unwrap();

        let m = header.voxel_to_world();
        let p = m * labelmesh_core::Vector3::new(1.0, 1.0, 1.0).push(1.0);
        assert_relative_eq!(p.x, 12.0);
        assert_relative_eq!(p.y, 23.0);
        assert_relative_eq!(p.z, 34.0);

        // Decoded grids ignore the mapping
        let loaded = NiftiReader::read_volume_from_bytes(&bytes).unwrap();
        assert_eq!(loaded.origin(), Point3f::origin());
    }

    #[test]
    fn test_qform_rotation() {
        let volume = LabelVolume::new([2, 2, 2], [1.0, 1.0, 1.0], Point3f::origin());
        let mut bytes = NiftiWriter::default().encode(&volume).unwrap();
        // sform off, qform on with a 180 degree turn about z (b = c = 0, d = 1)
        bytes[252..254].copy_from_slice(&1i16.to_le_bytes());
        bytes[254..256].copy_from_slice(&0i16.to_le_bytes());
        bytes[264..268].copy_from_slice(&1.0f32.to_le_bytes());

        let header = NiftiHeader::parse(&bytes).unwrap();
        let m = header.voxel_to_world();
        assert_relative_eq!(m[(0, 0)], -1.0);
        assert_relative_eq!(m[(1, 1)], -1.0);
        assert_relative_eq!(m[(2, 2)], 1.0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = NiftiReader::read_volume(temp_path("does_not_exist.nii"));
        assert!(matches!(result, Err(labelmesh_core::Error::Io(_))));
    }

    #[test]
    fn test_rejects_bad_headers() {
        let volume = sample_volume();
        let good = NiftiWriter::default().encode(&volume).unwrap();

        let mut bad_magic = good.clone();
        bad_magic[344..348].copy_from_slice(b"abc\0");
        assert!(matches!(
            NiftiReader::read_volume_from_bytes(&bad_magic),
            Err(labelmesh_core::Error::InvalidData(_))
        ));

        let mut pair = good.clone();
        pair[344..348].copy_from_slice(b"ni1\0");
        assert!(matches!(
            NiftiReader::read_volume_from_bytes(&pair),
            Err(labelmesh_core::Error::UnsupportedFormat(_))
        ));

        let mut nifti2 = good.clone();
        nifti2[..4].copy_from_slice(&540i32.to_le_bytes());
        assert!(matches!(
            NiftiReader::read_volume_from_bytes(&nifti2),
            Err(labelmesh_core::Error::UnsupportedFormat(_))
        ));

        let mut datatype = good.clone();
        datatype[70..72].copy_from_slice(&128i16.to_le_bytes());
        assert!(matches!(
            NiftiReader::read_volume_from_bytes(&datatype),
            Err(labelmesh_core::Error::UnsupportedFormat(_))
        ));

        let mut flat = good.clone();
        flat[40..42].copy_from_slice(&2i16.to_le_bytes());
        assert!(NiftiReader::read_volume_from_bytes(&flat).is_err());

        let truncated = &good[..good.len() - 1];
        assert!(matches!(
            NiftiReader::read_volume_from_bytes(truncated),
            Err(labelmesh_core::Error::InvalidData(_))
        ));

        assert!(NiftiReader::read_volume_from_bytes(&good[..100]).is_err());
    }

    #[test]
    fn test_writer_rejects_out_of_range_labels() {
        let mut volume = sample_volume();
        volume.set(0, 0, 0, 300).unwrap();
        assert!(NiftiWriter::new(NiftiDatatype::UInt8).encode(&volume).is_err());
        assert!(NiftiWriter::new(NiftiDatatype::Int16).encode(&volume).is_ok());
    }
}
