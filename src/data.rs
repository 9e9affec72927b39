//! Traits and impls used to read/write data to/from the wire.

/**
	trait for data types than can be packed/unpacked to/from a frame

	all multi-byte values are little endian on the wire
*/
pub trait PduData: Sized {
    /// byte size of the packed value
    const LEN: usize;

    fn pack(&self, dst: &mut [u8]) -> PackingResult<()>;
    fn unpack(src: &[u8]) -> PackingResult<Self>;
}

/// error raised when packing or unpacking a value does not fit the given bytes
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PackingError {
    BadSize(usize, &'static str),
    InvalidValue(&'static str),
}

pub type PackingResult<T> = Result<T, PackingError>;

/// macro implementing [PduData] for numeric types
macro_rules! num_pdudata {
	($t: ty) => { impl crate::data::PduData for $t {
            const LEN: usize = core::mem::size_of::<$t>();

            fn pack(&self, dst: &mut [u8]) -> crate::data::PackingResult<()> {
                if dst.len() < Self::LEN
                    {return Err(crate::data::PackingError::BadSize(dst.len(), "not enough bytes for number"))}
				dst[.. Self::LEN].copy_from_slice(&self.to_le_bytes());
				Ok(())
			}
			fn unpack(src: &[u8]) -> crate::data::PackingResult<Self> {
				Ok(Self::from_le_bytes(src.get(.. Self::LEN)
					.and_then(|s| s.try_into().ok())
					.ok_or(crate::data::PackingError::BadSize(src.len(), "not enough bytes for number"))?
					))
			}
		}};
}

num_pdudata!(u8);
num_pdudata!(u16);
num_pdudata!(i16);
num_pdudata!(i32);

/**
    macro implementing [PduData] for a given struct or enum generated with `bilge`

    `$id` is the primitive integer holding the bits, it must be byte-exact
*/
macro_rules! bilge_pdudata {
    ($t: ty, $id: ty) => { impl crate::data::PduData for $t {
        const LEN: usize = core::mem::size_of::<$id>();

        fn pack(&self, dst: &mut [u8]) -> crate::data::PackingResult<()> {
            <$id as crate::data::PduData>::pack(&<$id>::from(*self), dst)
        }
        fn unpack(src: &[u8]) -> crate::data::PackingResult<Self> {
            let raw = <$id as crate::data::PduData>::unpack(src)?;
            // bitfields without enum fields are infallible, the others may reject some values
            <$t>::try_from(raw)
                .map_err(|_| crate::data::PackingError::InvalidValue(concat!("invalid value for ", stringify!($t))))
        }
    }};
}
pub(crate) use bilge_pdudata;


/** helper to read/write sequencial data from/to a byte slice

    It is close to what [std::io::Cursor] is doing, but this struct allows reading forward without consuming the stream, and returns slices without copying the data. It is also meant to work with [PduData]

    Depending on the mutability of the slice this struct is built on, different capabilities are provided.
*/
pub struct Cursor<T> {
    position: usize,
    data: T,
}
impl<T> Cursor<T> {
    /// create a new cursor starting at position zero in the given slice
    pub fn new(data: T) -> Self   {Self{position: 0, data}}
}
impl<'a> Cursor<&'a [u8]> {
    /// read the next coming bytes with a [PduData] value, and increment the position
    pub fn unpack<T: PduData>(&mut self) -> PackingResult<T> {
        let value = T::unpack(self.remain())?;
        self.position += T::LEN;
        Ok(value)
    }
    /// return all the remaining bytes after current position, but does not advance the cursor
    pub fn remain(&self) -> &'a [u8] {
        let data = self.data;
        data.get(self.position ..).unwrap_or(&[])
    }
}
impl<'a> Cursor<&'a mut [u8]> {
    /// write the next coming bytes with a [PduData] value, and increment the position
    pub fn pack<T: PduData>(&mut self, value: &T) -> PackingResult<()> {
        value.pack(self.remain())?;
        self.position += T::LEN;
        Ok(())
    }
    /// return all the remaining bytes after current position, but does not advance the cursor
    pub fn remain(&mut self) -> &'_ mut [u8] {
        let position = self.position.min(self.data.len());
        &mut self.data[position ..]
    }
}
