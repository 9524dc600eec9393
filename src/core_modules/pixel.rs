// THEORY:
// The `Pixel` module is the most fundamental unit of the classifier. It is a
// "dumb" data container for a single RGB sample. Channel values are kept as
// `f64` and carry whatever scale the caller supplied: either already
// normalized to [0,1] or raw bytes in [0,255]. Detecting and removing that
// scale is the job of the index deriver, which sees the whole array at once;
// a single pixel cannot know which range it came from.
//
// Alpha is dropped on the way in. Panorama tiles are opaque and nothing
// downstream reads transparency.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = f64;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pixel {
        /// The red channel value, in [0,1] or [0,255].
        pub red: Channel,
        /// The green channel value, in [0,1] or [0,255].
        pub green: Channel,
        /// The blue channel value, in [0,1] or [0,255].
        pub blue: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// Largest of the three channels.
        pub fn max_channel(&self) -> Channel {
            self.red.max(self.green).max(self.blue)
        }

        /// Smallest of the three channels.
        pub fn min_channel(&self) -> Channel {
            self.red.min(self.green).min(self.blue)
        }

        /// Applies `f` to every channel.
        pub fn map(&self, f: impl Fn(Channel) -> Channel) -> Pixel {
            Pixel::new(f(self.red), f(self.green), f(self.blue))
        }
    }

    impl From<[Byte; 3]> for Pixel {
        fn from(bytes: [Byte; 3]) -> Self {
            Pixel::new(bytes[0] as Channel, bytes[1] as Channel, bytes[2] as Channel)
        }
    }

    impl From<image::Rgb<Byte>> for Pixel {
        fn from(rgb: image::Rgb<Byte>) -> Self {
            Pixel::from(rgb.0)
        }
    }
}
