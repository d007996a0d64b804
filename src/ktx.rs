//! KTX 1.x container parsing (header plus the first mip level).

use crate::error::{DisplayError, Result};

/// File identifier `«KTX 11»\r\n\x1A\n`.
pub const KTX_IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];

/// Endianness marker as read by a reader of the same endianness as the writer.
const ENDIAN_NATIVE: u32 = 0x0403_0201;

/// Endianness marker as read by a reader of the opposite endianness.
const ENDIAN_SWAPPED: u32 = 0x0102_0304;

/// `GL_RGBA`.
pub const GL_RGBA: u32 = 0x1908;

/// `GL_UNSIGNED_BYTE`.
pub const GL_UNSIGNED_BYTE: u32 = 0x1401;

/// The fixed 64-byte KTX header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct KtxHeader {
    /// Raw endianness field as stored in the file (little-endian read).
    pub endianness: u32,
    /// Pixel data type, `0` for compressed formats.
    pub gl_type: u32,
    /// Size of one `gl_type` element.
    pub gl_type_size: u32,
    /// Pixel format, `0` for compressed formats.
    pub gl_format: u32,
    /// Internal (possibly compressed) format.
    pub gl_internal_format: u32,
    /// Base internal format.
    pub gl_base_internal_format: u32,
    /// Width of mip 0.
    pub pixel_width: u32,
    /// Height of mip 0.
    pub pixel_height: u32,
    /// Depth, `0` for 2D textures.
    pub pixel_depth: u32,
    /// Array element count, `0` when not an array.
    pub number_of_array_elements: u32,
    /// `1`, or `6` for cube maps.
    pub number_of_faces: u32,
    /// Mip count, `0` means "generate".
    pub number_of_mipmap_levels: u32,
    /// Bytes of key/value metadata following the header.
    pub bytes_of_key_value_data: u32,
}

impl KtxHeader {
    /// Encoded header size.
    pub const SIZE: usize = 64;

    /// Parse the header at the start of `bytes`.
    ///
    /// Files written on a big-endian host are byte-swapped on read.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer, a wrong identifier or an unknown endianness
    /// marker.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(DisplayError::InvalidKtx(format!(
                "header needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        if bytes[..12] != KTX_IDENTIFIER {
            return Err(DisplayError::InvalidKtx("bad identifier".into()));
        }

        let endianness = read_u32(bytes, 12, false);
        let swap = match endianness {
            ENDIAN_NATIVE => false,
            ENDIAN_SWAPPED => true,
            other => {
                return Err(DisplayError::InvalidKtx(format!(
                    "unknown endianness marker {other:#010x}"
                )))
            }
        };

        let field = |index: usize| read_u32(bytes, 16 + index * 4, swap);
        Ok(Self {
            endianness,
            gl_type: field(0),
            gl_type_size: field(1),
            gl_format: field(2),
            gl_internal_format: field(3),
            gl_base_internal_format: field(4),
            pixel_width: field(5),
            pixel_height: field(6),
            pixel_depth: field(7),
            number_of_array_elements: field(8),
            number_of_faces: field(9),
            number_of_mipmap_levels: field(10),
            bytes_of_key_value_data: field(11),
        })
    }

    /// Whether the file was written with the opposite byte order.
    #[must_use]
    pub fn is_swapped(&self) -> bool {
        self.endianness == ENDIAN_SWAPPED
    }

    /// Whether the pixel data is in a compressed format.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.gl_type == 0
    }
}

/// A parsed container: the header and the bytes of mip level 0.
#[derive(Debug)]
pub struct KtxImage<'a> {
    /// Parsed header.
    pub header: KtxHeader,
    /// Mip 0 pixel data.
    pub data: &'a [u8],
}

impl<'a> KtxImage<'a> {
    /// Parse a whole `.ktx` file, keeping only the first mip level.
    ///
    /// # Errors
    ///
    /// Fails on a malformed header, 3D or array textures, or truncated data.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = KtxHeader::parse(bytes)?;

        if header.pixel_width == 0 || header.pixel_height == 0 {
            return Err(DisplayError::InvalidKtx("empty image".into()));
        }
        if header.pixel_depth > 1 || header.number_of_array_elements > 0 {
            return Err(DisplayError::InvalidKtx(
                "only 2D non-array textures are supported".into(),
            ));
        }

        let size_offset = KtxHeader::SIZE + header.bytes_of_key_value_data as usize;
        if bytes.len() < size_offset + 4 {
            return Err(DisplayError::InvalidKtx("missing image size".into()));
        }
        let image_size = read_u32(bytes, size_offset, header.is_swapped()) as usize;
        let start = size_offset + 4;
        let data = bytes
            .get(start..start + image_size)
            .ok_or_else(|| DisplayError::InvalidKtx("truncated image data".into()))?;

        if !header.is_compressed()
            && (header.gl_format != GL_RGBA || header.gl_type != GL_UNSIGNED_BYTE)
        {
            return Err(DisplayError::InvalidKtx(format!(
                "unsupported raw format {:#x}/{:#x}",
                header.gl_format, header.gl_type
            )));
        }

        Ok(Self { header, data })
    }
}

fn read_u32(bytes: &[u8], offset: usize, swap: bool) -> u32 {
    let raw = [
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ];
    if swap {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}
