mod cache;
#[cfg(feature = "pdf")]
mod pdfium;

pub use cache::RenderCache;
#[cfg(feature = "pdf")]
pub use pdfium::PdfiumRenderFactory;

#[cfg(feature = "pdf")]
pub type PdfRenderFactory = PdfiumRenderFactory;
