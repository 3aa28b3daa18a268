//! FITS helpers: open and create files, find HDUs, read and write keys,
//! long strings, table columns and images. Failures are [`FitsError`]s that
//! name the file and HDU.

use std::{
    ffi::{CStr, CString},
    fmt::Display,
    path::{Path, PathBuf},
    ptr,
};

use fitsio::{
    hdu::*,
    images::{ImageDescription, ImageType},
    FitsFile,
};
use ndarray::prelude::*;
use thiserror::Error;

use crate::{emissions::EmissionsError, transmittance::TransmittanceError};

#[derive(Error, Debug)]
pub enum FitsError {
    /// Error when opening a fits file.
    #[error("Couldn't open {}: {err}", .file.display())]
    Open {
        err: fitsio::errors::Error,
        file: PathBuf,
    },

    /// Error describing a HDU that couldn't be used.
    #[error("Couldn't open HDU {hdu} of {}: {err}", .file.display())]
    NotFound {
        err: fitsio::errors::Error,
        hdu: String,
        file: PathBuf,
    },

    /// Error when reading a key.
    #[error("Couldn't read key {key} from HDU {hdu_num} of {}: {err}", .file.display())]
    ReadKey {
        err: fitsio::errors::Error,
        key: String,
        hdu_num: usize,
        file: PathBuf,
    },

    /// A key's value couldn't be parsed into the desired type.
    #[error("Couldn't parse key {key} value '{value}' from HDU {hdu_num} of {}", .file.display())]
    Parse {
        key: String,
        value: String,
        hdu_num: usize,
        file: PathBuf,
    },

    /// A required key is absent.
    #[error("Key {key} is missing from HDU {hdu_num} of {}", .file.display())]
    MissingKey {
        key: String,
        hdu_num: usize,
        file: PathBuf,
    },

    /// Error when reading a long string.
    #[error("Couldn't read long string {key} from HDU {hdu_num} of {}: cfitsio status {status}", .file.display())]
    LongString {
        key: String,
        status: i32,
        hdu_num: usize,
        file: PathBuf,
    },

    /// Error when reading a column.
    #[error("Couldn't read column {col_name} from HDU {hdu_num} of {}: {err}", .file.display())]
    ReadCol {
        err: fitsio::errors::Error,
        col_name: String,
        hdu_num: usize,
        file: PathBuf,
    },

    /// None of the acceptable columns are in the table.
    #[error("HDU {hdu_num} of {} has none of the columns {expected:?}", .file.display())]
    MissingCol {
        expected: Vec<&'static str>,
        hdu_num: usize,
        file: PathBuf,
    },

    /// Error when reading an image.
    #[error("Couldn't read image from HDU {hdu_num} of {}: {err}", .file.display())]
    ReadImage {
        err: fitsio::errors::Error,
        hdu_num: usize,
        file: PathBuf,
    },

    #[error("HDU {hdu_num} of {} is not an image", .file.display())]
    NotImage { hdu_num: usize, file: PathBuf },

    #[error("HDU {hdu_num} of {} is not a table", .file.display())]
    NotTable { hdu_num: usize, file: PathBuf },

    #[error("Image in HDU {hdu_num} of {} has shape {shape:?}, expected {expected} dimensions", .file.display())]
    Dimensions {
        shape: Vec<usize>,
        expected: usize,
        hdu_num: usize,
        file: PathBuf,
    },

    /// Any other fitsio failure, typically while writing.
    #[error("cfitsio error with {}: {err}", .file.display())]
    Fitsio {
        err: fitsio::errors::Error,
        file: PathBuf,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Transmittance(#[from] TransmittanceError),

    #[error(transparent)]
    Emissions(#[from] EmissionsError),
}

/// Attach the file to a bare fitsio error.
pub(crate) fn fitsio_err(fptr: &FitsFile) -> impl Fn(fitsio::errors::Error) -> FitsError + '_ {
    move |err| FitsError::Fitsio {
        err,
        file: fptr.filename.clone(),
    }
}

/// Open a fits file.
pub(crate) fn fits_open<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::open(file.as_ref()).map_err(|err| FitsError::Open {
        err,
        file: file.as_ref().to_path_buf(),
    })
}

/// Create a fits file, clobbering anything already there.
pub(crate) fn fits_create<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::create(file.as_ref())
        .overwrite()
        .open()
        .map_err(|err| FitsError::Open {
            err,
            file: file.as_ref().to_path_buf(),
        })
}

/// Open a fits file's HDU.
pub(crate) fn fits_open_hdu<T: DescribesHdu + Display + Copy>(
    fits_fptr: &mut FitsFile,
    hdu_description: T,
) -> Result<FitsHdu, FitsError> {
    fits_fptr
        .hdu(hdu_description)
        .map_err(|err| FitsError::NotFound {
            err,
            hdu: hdu_description.to_string(),
            file: fits_fptr.filename.clone(),
        })
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type.
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, FitsError> {
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        Err(e) => {
            if let fitsio::errors::Error::Fits(fe) = &e {
                if fe.status == 202 || fe.status == 204 {
                    return Ok(None);
                }
            }
            return Err(FitsError::ReadKey {
                err: e,
                key: keyword.to_string(),
                hdu_num: hdu.number + 1,
                file: fits_fptr.filename.clone(),
            });
        }
    };

    match unparsed_value.parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => Err(FitsError::Parse {
            key: keyword.to_string(),
            value: unparsed_value,
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        }),
    }
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword, pull out
/// the value of the keyword, parsing it into the desired type.
pub(crate) fn fits_get_required_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<T, FitsError> {
    match fits_get_optional_key(fits_fptr, hdu, keyword)? {
        Some(value) => Ok(value),
        None => Err(FitsError::MissingKey {
            key: keyword.to_string(),
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        }),
    }
}

/// The names of the columns of a table HDU.
pub(crate) fn fits_get_col_names(
    fits_fptr: &FitsFile,
    hdu: &FitsHdu,
) -> Result<Vec<String>, FitsError> {
    match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            ..
        } => Ok(column_descriptions.iter().map(|c| c.name.clone()).collect()),
        _ => Err(FitsError::NotTable {
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        }),
    }
}

/// Get a column from a fits file's HDU.
pub(crate) fn fits_get_col<T: fitsio::tables::ReadsCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Vec<T>, FitsError> {
    hdu.read_col(fits_fptr, keyword)
        .map_err(|err| FitsError::ReadCol {
            err,
            col_name: keyword.to_string(),
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        })
}

/// Given a FITS file pointer, and a keyword to a long string keyword that may
/// or may not exist, pull out the long string of the keyword. This deals with
/// FITSs CONTINUE mechanism by calling a low level fits function.
pub(crate) fn fits_get_optional_key_long_string(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<String>, FitsError> {
    let long_string_err = |status, fits_fptr: &FitsFile| FitsError::LongString {
        key: keyword.to_string(),
        status,
        hdu_num: hdu.number + 1,
        file: fits_fptr.filename.clone(),
    };
    // Keywords with interior nuls can't exist.
    let keyword_ffi = match CString::new(keyword) {
        Ok(k) => k,
        Err(_) => return Ok(None),
    };

    let mut status = 0;
    let long_string = unsafe {
        let mut long_string_ptr = ptr::null_mut();
        // ffgkls = fits_read_key_longstr
        fitsio_sys::ffgkls(
            fits_fptr.as_raw(),
            keyword_ffi.as_ptr(),
            &mut long_string_ptr,
            ptr::null_mut(),
            &mut status,
        );
        // Check the call worked!
        match status {
            0 => {
                let long_string = CStr::from_ptr(long_string_ptr)
                    .to_string_lossy()
                    .into_owned();
                // Free the cfitsio-allocated string. The status code passed
                // isn't useful (have a look at the source if you don't believe
                // me!)
                // fffree = fits_free_memory
                fitsio_sys::fffree(long_string_ptr.cast(), &mut 0);
                Some(long_string)
            }
            202 | 204 => None,
            _ => return Err(long_string_err(status, fits_fptr)),
        }
    };

    Ok(long_string)
}

/// Get the shape of the image on the supplied HDU, in row-major order.
pub(crate) fn fits_get_image_size<'a>(
    fits_fptr: &FitsFile,
    hdu: &'a FitsHdu,
) -> Result<&'a Vec<usize>, FitsError> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => Ok(shape),
        _ => Err(FitsError::NotImage {
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        }),
    }
}

/// Given a FITS file pointer and a HDU, read the associated image.
pub(crate) fn fits_get_image<T: fitsio::images::ReadImage>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
) -> Result<T, FitsError> {
    match &hdu.info {
        HduInfo::ImageInfo { .. } => {
            hdu.read_image(fits_fptr)
                .map_err(|err| FitsError::ReadImage {
                    err,
                    hdu_num: hdu.number + 1,
                    file: fits_fptr.filename.clone(),
                })
        }
        _ => Err(FitsError::NotImage {
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        }),
    }
}

/// Read a 1-D image HDU named `extname`.
pub(crate) fn fits_get_array1(
    fits_fptr: &mut FitsFile,
    extname: &str,
) -> Result<Array1<f64>, FitsError> {
    let hdu = fits_open_hdu(fits_fptr, extname)?;
    let shape = fits_get_image_size(fits_fptr, &hdu)?.clone();
    if shape.len() != 1 {
        return Err(FitsError::Dimensions {
            shape,
            expected: 1,
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        });
    }
    let data: Vec<f64> = fits_get_image(fits_fptr, &hdu)?;
    Ok(Array1::from(data))
}

/// Read a 2-D image HDU named `extname`.
pub(crate) fn fits_get_array2(
    fits_fptr: &mut FitsFile,
    extname: &str,
) -> Result<Array2<f64>, FitsError> {
    let hdu = fits_open_hdu(fits_fptr, extname)?;
    let shape = fits_get_image_size(fits_fptr, &hdu)?.clone();
    if shape.len() != 2 {
        return Err(FitsError::Dimensions {
            shape,
            expected: 2,
            hdu_num: hdu.number + 1,
            file: fits_fptr.filename.clone(),
        });
    }
    let data: Vec<f64> = fits_get_image(fits_fptr, &hdu)?;
    Ok(Array2::from_shape_vec((shape[0], shape[1]), data)?)
}

/// Write a double-precision image HDU. `shape` is in row-major order and
/// `data` must be in that order too.
pub(crate) fn fits_write_image(
    fits_fptr: &mut FitsFile,
    extname: &str,
    shape: &[usize],
    data: &[f64],
    bunit: Option<&str>,
) -> Result<FitsHdu, FitsError> {
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: shape,
    };
    let hdu = fits_fptr
        .create_image(extname.to_string(), &description)
        .map_err(fitsio_err(fits_fptr))?;
    hdu.write_image(fits_fptr, data)
        .map_err(fitsio_err(fits_fptr))?;
    if let Some(bunit) = bunit {
        hdu.write_key(fits_fptr, "BUNIT", bunit)
            .map_err(fitsio_err(fits_fptr))?;
    }
    Ok(hdu)
}

pub(crate) fn fits_write_array1(
    fits_fptr: &mut FitsFile,
    extname: &str,
    a: ArrayView1<f64>,
    bunit: Option<&str>,
) -> Result<FitsHdu, FitsError> {
    fits_write_image(fits_fptr, extname, &[a.len()], &a.to_vec(), bunit)
}

pub(crate) fn fits_write_array2(
    fits_fptr: &mut FitsFile,
    extname: &str,
    a: ArrayView2<f64>,
    bunit: Option<&str>,
) -> Result<FitsHdu, FitsError> {
    let data: Vec<f64> = a.iter().copied().collect();
    fits_write_image(fits_fptr, extname, &[a.nrows(), a.ncols()], &data, bunit)
}

pub(crate) fn fits_write_array3(
    fits_fptr: &mut FitsFile,
    extname: &str,
    a: ArrayView3<f64>,
    bunit: Option<&str>,
) -> Result<FitsHdu, FitsError> {
    let data: Vec<f64> = a.iter().copied().collect();
    let (n0, n1, n2) = a.dim();
    fits_write_image(fits_fptr, extname, &[n0, n1, n2], &data, bunit)
}

/// Write a binary table of double columns, each with a unit.
pub(crate) fn fits_write_table(
    fits_fptr: &mut FitsFile,
    extname: &str,
    columns: &[(&str, &str, &[f64])],
) -> Result<FitsHdu, FitsError> {
    use fitsio::tables::{ColumnDataType, ColumnDescription};

    let descriptions = columns
        .iter()
        .map(|(name, _, _)| {
            ColumnDescription::new(*name)
                .with_type(ColumnDataType::Double)
                .create()
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(fitsio_err(fits_fptr))?;
    let hdu = fits_fptr
        .create_table(extname.to_string(), &descriptions)
        .map_err(fitsio_err(fits_fptr))?;
    for (i, (name, unit, data)) in columns.iter().enumerate() {
        hdu.write_col(fits_fptr, *name, *data)
            .map_err(fitsio_err(fits_fptr))?;
        hdu.write_key(fits_fptr, &format!("TUNIT{}", i + 1), *unit)
            .map_err(fitsio_err(fits_fptr))?;
    }
    Ok(hdu)
}
