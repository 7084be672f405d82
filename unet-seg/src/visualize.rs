//! Figures for visually inspecting inputs, masks and predictions.
//!
//! Panels are laid out on a white canvas and written as PNG. Single-channel
//! panels are drawn in grayscale stretched between their minimum and maximum,
//! three-channel panels are drawn as RGB clamped to `[0, 1]`.

use std::path::Path;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use image::{imageops, Rgb, RgbImage};

use crate::{
    dataset::{SegmentationBatcher, SegmentationItem},
    error::{VisualizeError, VisualizeResult},
    models::UNet,
};

/// Gap between panels and around the figure, in pixels.
pub const PANEL_MARGIN: u32 = 8;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> VisualizeResult<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| VisualizeError::TensorData {
            reason: format!("{e:?}"),
        })
}

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Converts a `[C, H, W]` tensor with one or three channels into an image.
///
/// # Errors
///
/// Fails for any other channel count.
pub fn tensor_to_panel<B: Backend>(tensor: Tensor<B, 3>) -> VisualizeResult<RgbImage> {
    let [channels, height, width] = tensor.dims();
    if channels != 1 && channels != 3 {
        return Err(VisualizeError::UnsupportedShape {
            shape: vec![channels, height, width],
            reason: "expected 1 or 3 channels",
        });
    }

    let hwc = tensor_values(tensor.permute([1, 2, 0]))?;
    let (width, height) = (width as u32, height as u32);

    let panel = if channels == 1 {
        let (min, max) = hwc
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        RgbImage::from_fn(width, height, |x, y| {
            let v = hwc[(y * width + x) as usize];
            let level = if range > 0.0 { (v - min) / range } else { 0.0 };
            let level = to_u8(level);
            Rgb([level, level, level])
        })
    } else {
        RgbImage::from_fn(width, height, |x, y| {
            let i = ((y * width + x) * 3) as usize;
            Rgb([to_u8(hwc[i]), to_u8(hwc[i + 1]), to_u8(hwc[i + 2])])
        })
    };

    Ok(panel)
}

/// Lays out rows of panels on a white canvas.
///
/// Each grid cell is as large as the largest panel.
///
/// # Errors
///
/// Fails if there are no panels.
pub fn render_grid(rows: &[Vec<RgbImage>]) -> VisualizeResult<RgbImage> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return Err(VisualizeError::EmptyDisplayList);
    }

    let panels = rows.iter().flatten();
    let cell_w = panels.clone().map(RgbImage::width).max().unwrap_or(0);
    let cell_h = panels.map(RgbImage::height).max().unwrap_or(0);

    let width = columns as u32 * (cell_w + PANEL_MARGIN) + PANEL_MARGIN;
    let height = rows.len() as u32 * (cell_h + PANEL_MARGIN) + PANEL_MARGIN;
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    for (row_index, row) in rows.iter().enumerate() {
        let y = PANEL_MARGIN + row_index as u32 * (cell_h + PANEL_MARGIN);
        for (column, panel) in row.iter().enumerate() {
            let x = PANEL_MARGIN + column as u32 * (cell_w + PANEL_MARGIN);
            imageops::overlay(&mut canvas, panel, i64::from(x), i64::from(y));
        }
    }

    Ok(canvas)
}

/// Renders the tensors side by side in a single row.
///
/// # Errors
///
/// Fails if the list is empty or a tensor cannot be drawn.
pub fn render_row<B: Backend>(display_list: Vec<Tensor<B, 3>>) -> VisualizeResult<RgbImage> {
    let panels = display_list
        .into_iter()
        .map(tensor_to_panel)
        .collect::<VisualizeResult<Vec<_>>>()?;
    render_grid(&[panels])
}

fn save(figure: &RgbImage, path: &Path) -> VisualizeResult<()> {
    figure
        .save(path)
        .map_err(|source| VisualizeError::SaveFailed {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::info!(path = %path.display(), "saved figure");
    Ok(())
}

/// Renders `display_list` as one row, e.g. `[image, true mask, predicted
/// mask]`, and writes it to `path`.
///
/// # Errors
///
/// Fails if the figure cannot be rendered or written.
pub fn display<B: Backend>(
    display_list: Vec<Tensor<B, 3>>,
    path: impl AsRef<Path>,
) -> VisualizeResult<()> {
    save(&render_row(display_list)?, path.as_ref())
}

/// Renders inputs on the top row and predicted class maps below.
///
/// `images` is `[N, 3, H, W]`; `predicted` is `[N, 1, H, W]` class indices.
///
/// # Errors
///
/// Fails if the batch sizes differ or a panel cannot be drawn.
pub fn render_predictions<B: Backend>(
    images: Tensor<B, 4>,
    predicted: Tensor<B, 4, Int>,
) -> VisualizeResult<RgbImage> {
    let [num, ..] = images.dims();
    if predicted.dims()[0] != num {
        return Err(VisualizeError::UnsupportedShape {
            shape: predicted.dims().to_vec(),
            reason: "prediction batch size differs from image batch size",
        });
    }

    let predicted = predicted.float();
    let mut top = Vec::with_capacity(num);
    let mut bottom = Vec::with_capacity(num);
    for i in 0..num {
        top.push(tensor_to_panel(
            images.clone().slice([i..i + 1]).squeeze::<3>(0),
        )?);
        bottom.push(tensor_to_panel(
            predicted.clone().slice([i..i + 1]).squeeze::<3>(0),
        )?);
    }

    render_grid(&[top, bottom])
}

/// Runs `model` on the first `num` samples of `dataset` and writes a figure
/// of the inputs and their predicted masks to `path`.
///
/// # Errors
///
/// Fails if fewer than `num` samples can be loaded, or the figure cannot be
/// rendered or written.
pub fn predictions<B: Backend, D: Dataset<SegmentationItem>>(
    dataset: &D,
    model: &UNet<B>,
    num: usize,
    device: &B::Device,
    path: impl AsRef<Path>,
) -> VisualizeResult<()> {
    let items: Vec<_> = dataset.iter().take(num).collect();
    if num == 0 || items.len() < num {
        return Err(VisualizeError::NotEnoughSamples {
            requested: num,
            available: items.len(),
        });
    }

    let batch = SegmentationBatcher::<B>::new().batch(items, device);
    let predicted = model.predict_mask(batch.images.clone());
    let figure = render_predictions(batch.images, predicted)?;
    save(&figure, path.as_ref())
}

#[cfg(test)]
mod tests {
    use burn::data::dataset::InMemDataset;

    use super::*;
    use crate::{models::UNetConfig, tests::TestBackend};

    #[test]
    fn mask_panel_is_stretched_to_full_range() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0], [1.0, 0.0]], &device)
            .unsqueeze::<3>();

        let panel = tensor_to_panel(mask).unwrap();

        assert_eq!(panel.dimensions(), (2, 2));
        assert_eq!(panel.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(panel.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn rgb_panel_keeps_colours() {
        let device = Default::default();
        let red = Tensor::<TestBackend, 3>::from_floats([[[1.0]], [[0.0]], [[0.0]]], &device);

        let panel = tensor_to_panel(red).unwrap();

        assert_eq!(panel.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn two_channel_tensors_are_rejected() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 3>::zeros([2, 4, 4], &device);

        assert!(matches!(
            tensor_to_panel(tensor),
            Err(VisualizeError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn row_places_panels_side_by_side() {
        let device = Default::default();
        let image = Tensor::<TestBackend, 3>::ones([3, 10, 12], &device);
        let mask = Tensor::<TestBackend, 3>::zeros([1, 10, 12], &device);

        let figure = render_row(vec![image, mask]).unwrap();

        assert_eq!(
            figure.dimensions(),
            (2 * 12 + 3 * PANEL_MARGIN, 10 + 2 * PANEL_MARGIN)
        );
        assert!(render_row::<TestBackend>(Vec::new()).is_err());
    }

    #[test]
    fn display_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("row.png");
        let device = Default::default();

        display(
            vec![Tensor::<TestBackend, 3>::ones([3, 8, 8], &device)],
            &path,
        )
        .unwrap();

        let written = image::open(&path).unwrap();
        assert_eq!(written.width(), 8 + 2 * PANEL_MARGIN);
    }

    #[test]
    fn predictions_render_two_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.png");
        let device = Default::default();
        let item = SegmentationItem {
            image: vec![0.5; 16 * 16 * 3],
            mask: vec![0.0; 16 * 16 * 2],
            height: 16,
            width: 16,
            mask_channels: 2,
        };
        let dataset = InMemDataset::new(vec![item.clone(), item.clone(), item]);
        let model = UNetConfig::new(2)
            .with_filters(2)
            .init::<TestBackend>(&device)
            .unwrap();

        predictions(&dataset, &model, 2, &device, &path).unwrap();

        let written = image::open(&path).unwrap();
        assert_eq!(written.width(), 2 * 16 + 3 * PANEL_MARGIN);
        assert_eq!(written.height(), 2 * 16 + 3 * PANEL_MARGIN);

        assert!(matches!(
            predictions(&dataset, &model, 4, &device, &path),
            Err(VisualizeError::NotEnoughSamples { requested: 4, available: 3 })
        ));
    }
}
