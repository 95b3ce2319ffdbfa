use crate::error::{EngineError, EngineResult};

/// Output frame rate as an exact rational (e.g. 30000/1001 for NTSC rates).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> EngineResult<Self> {
        if den == 0 {
            return Err(EngineError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(EngineError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    pub fn frame_duration(self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.frame_duration_secs())
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn byte_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_rejects_zero_terms() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(30, 0).is_err());
    }

    #[test]
    fn fps_frame_duration_matches_rate() {
        let fps = Fps::new(30, 1).unwrap();
        assert!((fps.frame_duration_secs() - 1.0 / 30.0).abs() < 1e-12);

        let ntsc = Fps::new(30000, 1001).unwrap();
        assert!((ntsc.as_f64() - 29.97).abs() < 0.01);
    }

    #[test]
    fn canvas_byte_len_is_rgba8() {
        let c = Canvas {
            width: 4,
            height: 3,
        };
        assert_eq!(c.byte_len(), 48);
    }
}
