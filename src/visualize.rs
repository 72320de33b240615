use crate::batch::ImageBatch;
use crate::error::{Error, Result};
use ndarray::ArrayView3;

pub const DEFAULT_IMAGE_COUNT: usize = 10;

// Renders the first `n` images of two batches as a two-row grid of shaded characters, the top row
// from `top` and the bottom row from `bottom`, with images in a row separated by a blank column.
pub fn render_grid(top: &ImageBatch, bottom: &ImageBatch, n: usize) -> Result<String> {
    let shape = top.image_shape();
    if bottom.image_shape() != shape {
        return Err(Error::shape_mismatch(
            &shape.to_vec(),
            &bottom.image_shape().to_vec(),
        ));
    }
    if shape.channels != 1 {
        return Err(Error::Batch(format!(
            "only single-channel images can be rendered, found {} channels",
            shape.channels
        )));
    }

    let count = n.min(top.len()).min(bottom.len());
    let mut grid = String::new();

    for (row_index, batch) in [top, bottom].into_iter().enumerate() {
        if row_index > 0 {
            grid.push('\n');
        }
        let images: Vec<ArrayView3<'_, f32>> =
            (0..count).filter_map(|index| batch.image(index)).collect();

        for pixel_row in 0..shape.height {
            let line = images
                .iter()
                .map(|image| {
                    (0..shape.width)
                        .map(|column| shade(image[[pixel_row, column, 0]]))
                        .collect::<String>()
                })
                .collect::<Vec<_>>()
                .join(" ");
            grid.push_str(&line);
            grid.push('\n');
        }
    }

    Ok(grid)
}

fn shade(value: f32) -> char {
    match value {
        a if a < 0.2 => ' ',
        a if a < 0.4 => '░',
        a if a < 0.6 => '▒',
        a if a < 0.8 => '▓',
        _ => '█',
    }
}
