use anyhow::{anyhow, bail, Context, Result};
use resvg::{tiny_skia, usvg};

/// Decoded picture, ready to upload as an egui texture.
#[derive(Debug)]
pub struct Picture {
    pub width: usize,
    pub height: usize,
    /// RGBA8 pixels, row-major, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
    /// Whether `rgba` is premultiplied (resvg output is, `image` output isn't).
    pub premultiplied: bool,
}

impl Picture {
    /// Decode downloaded bytes. `extension` is the lower-cased file
    /// extension of the source URL; SVG is rasterized, everything else goes
    /// through the `image` crate's format sniffing.
    pub fn decode(bytes: &[u8], extension: &str) -> Result<Self> {
        if extension == "svg" {
            return Self::decode_svg(bytes);
        }
        let img = image::load_from_memory(bytes).context("decoding picture")?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width: width as usize,
            height: height as usize,
            rgba: rgba.into_raw(),
            premultiplied: false,
        })
    }

    fn decode_svg(bytes: &[u8]) -> Result<Self> {
        let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
            .map_err(|e| anyhow!("parsing SVG: {e}"))?;
        let size = tree.size().to_int_size();
        let (width, height) = (size.width(), size.height());
        if width == 0 || height == 0 {
            bail!("SVG has empty dimensions");
        }
        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate {width}x{height} pixmap"))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
        Ok(Self {
            width: width as usize,
            height: height as usize,
            rgba: pixmap.take(),
            premultiplied: true,
        })
    }

    pub fn to_color_image(&self) -> egui::ColorImage {
        let size = [self.width, self.height];
        if self.premultiplied {
            egui::ColorImage::from_rgba_premultiplied(size, &self.rgba)
        } else {
            egui::ColorImage::from_rgba_unmultiplied(size, &self.rgba)
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_raster_bytes_regardless_of_extension() {
        let png = encode_test_png(3, 2);
        let pic = Picture::decode(&png, "jpg").unwrap();
        assert_eq!((pic.width, pic.height), (3, 2));
        assert_eq!(pic.rgba.len(), 3 * 2 * 4);
        assert_eq!(&pic.rgba[..4], &[10, 20, 30, 255]);
        assert!(!pic.premultiplied);
    }

    #[test]
    fn rasterizes_svg() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="5">
            <rect width="4" height="5" fill="red"/></svg>"#;
        let pic = Picture::decode(svg, "svg").unwrap();
        assert_eq!((pic.width, pic.height), (4, 5));
        assert_eq!(pic.rgba.len(), 4 * 5 * 4);
        assert!(pic.premultiplied);
    }

    #[test]
    fn garbage_bytes_fail_with_context() {
        let err = Picture::decode(b"<html>not a picture</html>", "png").unwrap_err();
        assert!(format!("{err:#}").starts_with("decoding picture"));
    }

    #[test]
    fn color_image_matches_dimensions() {
        let pic = Picture::decode(&encode_test_png(7, 3), "png").unwrap();
        assert_eq!(pic.to_color_image().size, [7, 3]);
    }
}
