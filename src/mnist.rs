use crate::batch::{ImageBatch, ImageShape};
use crate::error::{Error, Result};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use itertools::Itertools;
use ndarray::Array4;
use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};
use tracing::info;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte.gz";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte.gz";

// IDX type codes, stored in the third byte of the magic number.
const UNSIGNED_BYTE: u8 = 0x08;
const FLOAT: u8 = 0x0D;
const IMAGE_DIMENSIONS: u8 = 3;

/// Clean training and test images. MNIST's labels are never read, since an autoencoder's target
/// is its own input.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: ImageBatch,
    pub test: ImageBatch,
}

pub fn load_mnist(dir: &Path) -> Result<Dataset> {
    // MNIST ships its 60000 training images and 10000 test images as two separate gzipped files.
    // Both are read the same way, and both must hold images of the same size, since a single
    // network is trained on one and evaluated on the other.
    let train = read_images_gz(&dir.join(TRAIN_IMAGES))?;
    let test = read_images_gz(&dir.join(TEST_IMAGES))?;

    if train.image_shape() != test.image_shape() {
        return Err(Error::shape_mismatch(
            &train.image_shape().to_vec(),
            &test.image_shape().to_vec(),
        ));
    }

    info!(
        train = train.len(),
        test = test.len(),
        shape = %train.image_shape(),
        "loaded MNIST images"
    );
    Ok(Dataset { train, test })
}

pub fn read_images_gz(path: &Path) -> Result<ImageBatch> {
    let file = File::open(path)?;
    read_images(GzDecoder::new(file))
}

pub fn write_images_gz(path: &Path, batch: &ImageBatch) -> Result<()> {
    // Compress on the way out so the prepared files stay roughly the size of the originals. The
    // encoder has to be finished explicitly, as dropping it would swallow any error writing the
    // gzip trailer.
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    write_images(&mut encoder, batch)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Parses an IDX image file: either the 8-bit grayscale format MNIST ships in, which is
/// normalized into [0, 1], or the 32-bit float format written by [`write_images`].
pub fn read_images<R: Read>(mut reader: R) -> Result<ImageBatch> {
    // Read the whole file into memory, then walk it with a single iterator. Taking the iterator by
    // reference for the header means whatever is left over afterwards is exactly the pixel data.
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let mut bytes_iter = bytes.into_iter();

    // The magic number is two zero bytes, the type code of every element, and the number of
    // dimensions. Image files have three: images, rows and columns.
    let magic = bytes_iter.by_ref().take(4).collect::<Vec<_>>();
    let (type_code, dimensions) = match magic[..] {
        [0, 0, type_code, dimensions] => (type_code, dimensions),
        _ => return Err(Error::Idx(format!("bad magic number {magic:?}"))),
    };
    if dimensions != IMAGE_DIMENSIONS {
        return Err(Error::Idx(format!(
            "expected {IMAGE_DIMENSIONS} dimensions for an image file, found {dimensions}"
        )));
    }

    // Each dimension is a big-endian 32-bit integer.
    let header_bytes = bytes_iter
        .by_ref()
        .take(4 * dimensions as usize)
        .collect::<Vec<_>>();
    if header_bytes.len() != 4 * dimensions as usize {
        return Err(Error::Idx("truncated header".to_string()));
    }
    let (images, rows, columns) = header_bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
        .collect_tuple::<(usize, usize, usize)>()
        .ok_or_else(|| Error::Idx("truncated header".to_string()))?;

    let shape = ImageShape::new(rows, columns, 1);
    // The header is untrusted, so the element count is multiplied out with overflow checks
    // rather than through ImageShape::pixels.
    let elements = images
        .checked_mul(rows)
        .and_then(|count| count.checked_mul(columns))
        .ok_or_else(|| Error::Idx(format!("{images} images of shape {shape} is too large")))?;
    let payload = bytes_iter.collect::<Vec<_>>();

    // The rest of the file is the pixel data itself. Its length has to match what the header
    // promised exactly; anything more or less means the file was truncated or isn't an image file.
    match type_code {
        UNSIGNED_BYTE => {
            check_payload(&payload, elements)?;
            ImageBatch::from_bytes(images, shape, &payload)
        }
        FLOAT => {
            // Every float takes four bytes, which can overflow even when the element count
            // itself did not.
            let expected = elements.checked_mul(4).ok_or_else(|| {
                Error::Idx(format!("{images} float images of shape {shape} is too large"))
            })?;
            check_payload(&payload, expected)?;
            let values = payload
                .chunks_exact(4)
                .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect::<Vec<_>>();
            let pixels = Array4::from_shape_vec((images, rows, columns, 1), values)
                .map_err(|err| Error::Idx(err.to_string()))?;
            ImageBatch::from_array(pixels)
        }
        other => Err(Error::Idx(format!("unsupported type code {other:#04x}"))),
    }
}

fn check_payload(payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(Error::Idx(format!(
            "expected {expected} bytes of pixel data, found {}",
            payload.len()
        )));
    }
    Ok(())
}

/// Writes single-channel images as an IDX float file, so values survive without re-quantizing.
pub fn write_images<W: Write>(mut writer: W, batch: &ImageBatch) -> Result<()> {
    let shape = batch.image_shape();
    if shape.channels != 1 {
        return Err(Error::Batch(format!(
            "IDX image files hold a single channel, batch has {}",
            shape.channels
        )));
    }

    // Write the same header layout read_images expects: the magic number with the float type
    // code, then the number of images, rows and columns as big-endian 32-bit integers. The pixel
    // values follow in the batch's own row-major order, four big-endian bytes each.
    writer.write_all(&[0, 0, FLOAT, IMAGE_DIMENSIONS])?;
    for dimension in [batch.len(), shape.height, shape.width] {
        let dimension = u32::try_from(dimension)
            .map_err(|_| Error::Idx(format!("dimension {dimension} does not fit in 32 bits")))?;
        writer.write_all(&dimension.to_be_bytes())?;
    }
    for value in batch.pixels().iter() {
        writer.write_all(&value.to_be_bytes())?;
    }
    Ok(())
}
