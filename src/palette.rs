use image::Rgb;

/// Largest class count for which the bit-interleaved palette stays collision free.
pub const MAX_PALETTE_SIZE: usize = 256;

/// ラベル番号から表示色への固定テーブル
///
/// Colors are stored as `Rgb<u8>` and the whole crate treats pixels as R, G, B.
/// The table is immutable once generated and can be shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb<u8>>,
}

impl Palette {
    /// Bit-interleaved palette for `n` labels (the PASCAL VOC color map for `n = 21`).
    pub fn new(n: usize) -> Self {
        Self {
            colors: generate_palette(n),
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, label: u32) -> Option<Rgb<u8>> {
        self.colors.get(label as usize).copied()
    }

    pub fn colors(&self) -> &[Rgb<u8>] {
        &self.colors
    }
}

/// Generate `n` colors by spreading the low three bits of each label index over
/// the high bits of the red, green and blue channels, three bits per bit-plane.
pub fn generate_palette(n: usize) -> Vec<Rgb<u8>> {
    (0..n).map(label_color).collect()
}

fn label_color(label: usize) -> Rgb<u8> {
    let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
    let mut c = label;
    for j in 0..8 {
        let shift = 7 - j;
        r |= ((c & 1) as u8) << shift;
        g |= (((c >> 1) & 1) as u8) << shift;
        b |= (((c >> 2) & 1) as u8) << shift;
        c >>= 3;
    }
    Rgb([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_palette_is_deterministic() {
        assert_eq!(generate_palette(21), generate_palette(21));
        assert_eq!(Palette::new(21), Palette::new(21));
    }

    #[test]
    fn test_voc_reference_colors() {
        let palette = generate_palette(21);
        assert_eq!(palette.len(), 21);
        assert_eq!(palette[0], Rgb([0, 0, 0]));
        assert_eq!(palette[1], Rgb([128, 0, 0]));
        assert_eq!(palette[2], Rgb([0, 128, 0]));
        assert_eq!(palette[3], Rgb([128, 128, 0]));
        // 15 = person
        assert_eq!(palette[15], Rgb([192, 128, 128]));
        assert_eq!(palette[20], Rgb([0, 64, 128]));
    }

    #[test]
    fn test_palette_colors_are_distinct_up_to_256() {
        let palette = generate_palette(MAX_PALETTE_SIZE);
        let unique: HashSet<[u8; 3]> = palette.iter().map(|c| c.0).collect();
        assert_eq!(unique.len(), MAX_PALETTE_SIZE);
    }

    #[test]
    fn test_empty_palette() {
        let palette = Palette::new(0);
        assert!(palette.is_empty());
        assert_eq!(palette.get(0), None);
    }

    #[test]
    fn test_prefix_stability() {
        // 大きいパレットの先頭は小さいパレットと一致する
        let small = generate_palette(21);
        let large = generate_palette(256);
        assert_eq!(&large[..21], small.as_slice());
    }
}
