//! TensorFlow Lite C API bindings and the model adapters built on them.

mod classifier;
mod detector;
mod landmarker;

pub use classifier::TfliteClassifier;
pub use detector::TfliteDetector;
pub use landmarker::TfliteLandmarker;

use anyhow::Result;
use image::RgbImage;
use std::{ffi::CString, os::raw::{c_char, c_int, c_void}, ptr};
use tracing::info;

use crate::preprocess::{dequantize, to_input, Preprocess};

#[repr(C)]
struct TfLiteModel;
#[repr(C)]
struct TfLiteInterpreterOptions;
#[repr(C)]
struct TfLiteInterpreter;
#[repr(C)]
struct TfLiteTensor;
#[repr(C)]
struct TfLiteDelegate;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct TfLiteQuantizationParams {
    scale: f32,
    zero_point: i32,
}

// TfLiteType
const K_TFLITE_FLOAT32: c_int = 1;
const K_TFLITE_UINT8: c_int = 3;

#[link(name = "tensorflowlite_c")]
extern "C" {
    fn TfLiteModelCreateFromFile(model_path: *const c_char) -> *mut TfLiteModel;
    fn TfLiteModelDelete(model: *mut TfLiteModel);

    fn TfLiteInterpreterOptionsCreate() -> *mut TfLiteInterpreterOptions;
    fn TfLiteInterpreterOptionsDelete(options: *mut TfLiteInterpreterOptions);
    fn TfLiteInterpreterOptionsSetNumThreads(options: *mut TfLiteInterpreterOptions, num_threads: c_int);
    fn TfLiteInterpreterOptionsAddDelegate(options: *mut TfLiteInterpreterOptions, delegate: *mut TfLiteDelegate);

    fn TfLiteInterpreterCreate(model: *const TfLiteModel, options: *const TfLiteInterpreterOptions) -> *mut TfLiteInterpreter;
    fn TfLiteInterpreterDelete(interpreter: *mut TfLiteInterpreter);

    fn TfLiteInterpreterAllocateTensors(interpreter: *mut TfLiteInterpreter) -> c_int;
    fn TfLiteInterpreterInvoke(interpreter: *mut TfLiteInterpreter) -> c_int;

    fn TfLiteInterpreterGetOutputTensorCount(interpreter: *const TfLiteInterpreter) -> c_int;
    fn TfLiteInterpreterGetInputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *mut TfLiteTensor;
    fn TfLiteInterpreterGetOutputTensor(interpreter: *const TfLiteInterpreter, index: c_int) -> *const TfLiteTensor;

    fn TfLiteTensorType(tensor: *const TfLiteTensor) -> c_int;
    fn TfLiteTensorData(tensor: *const TfLiteTensor) -> *mut c_void;
    fn TfLiteTensorByteSize(tensor: *const TfLiteTensor) -> usize;
    fn TfLiteTensorQuantizationParams(tensor: *const TfLiteTensor) -> TfLiteQuantizationParams;

    fn TfLiteTensorNumDims(tensor: *const TfLiteTensor) -> c_int;
    fn TfLiteTensorDim(tensor: *const TfLiteTensor, dim_index: c_int) -> c_int;
}

#[cfg(feature = "vision-coral")]
#[link(name = "edgetpu")]
extern "C" {
    fn edgetpu_create_delegate(device_type: c_int, device_path: *const c_char, options: *const c_char) -> *mut TfLiteDelegate;
    fn edgetpu_free_delegate(delegate: *mut TfLiteDelegate);
}

/// One loaded model with allocated tensors.
pub struct Interpreter {
    path: String,
    model: *mut TfLiteModel,
    opts: *mut TfLiteInterpreterOptions,
    interp: *mut TfLiteInterpreter,
    #[cfg(feature = "vision-coral")]
    delegate: Option<*mut TfLiteDelegate>,
}

// Owned exclusively; the C API has no thread affinity.
unsafe impl Send for Interpreter {}

impl Interpreter {
    pub fn load(model_path: &str, use_coral: bool) -> Result<Self> {
        let cpath = CString::new(model_path)?;
        let model = unsafe { TfLiteModelCreateFromFile(cpath.as_ptr()) };
        anyhow::ensure!(!model.is_null(), "failed to load tflite model: {}", model_path);

        let opts = unsafe { TfLiteInterpreterOptionsCreate() };
        if opts.is_null() {
            unsafe { TfLiteModelDelete(model) };
            anyhow::bail!("failed to create tflite options");
        }
        unsafe { TfLiteInterpreterOptionsSetNumThreads(opts, 2) };

        // from here on Drop releases whatever was created
        let mut me = Self {
            path: model_path.to_string(),
            model,
            opts,
            interp: ptr::null_mut(),
            #[cfg(feature = "vision-coral")]
            delegate: None,
        };

        #[cfg(feature = "vision-coral")]
        if use_coral {
            let d = unsafe { edgetpu_create_delegate(0, ptr::null(), ptr::null()) };
            anyhow::ensure!(!d.is_null(), "failed to create EdgeTPU delegate");
            unsafe { TfLiteInterpreterOptionsAddDelegate(me.opts, d) };
            me.delegate = Some(d);
        }

        #[cfg(not(feature = "vision-coral"))]
        if use_coral {
            anyhow::bail!("use_coral=true but binary not built with --features vision-coral");
        }

        me.interp = unsafe { TfLiteInterpreterCreate(me.model, me.opts) };
        anyhow::ensure!(!me.interp.is_null(), "failed to create tflite interpreter");

        let rc = unsafe { TfLiteInterpreterAllocateTensors(me.interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterAllocateTensors failed");

        info!("vision: loaded TFLite model: {}", model_path);
        Ok(me)
    }

    fn input(&mut self) -> Result<*mut TfLiteTensor> {
        let t = unsafe { TfLiteInterpreterGetInputTensor(self.interp, 0) };
        anyhow::ensure!(!t.is_null(), "no input tensor");
        Ok(t)
    }

    fn output(&self, index: usize) -> Result<*const TfLiteTensor> {
        let t = unsafe { TfLiteInterpreterGetOutputTensor(self.interp, index as c_int) };
        anyhow::ensure!(!t.is_null(), "no output tensor {}", index);
        Ok(t)
    }

    pub fn output_dims(&self, index: usize) -> Result<Vec<i32>> {
        Ok(tensor_dims(self.output(index)?))
    }

    pub fn output_count(&self) -> usize {
        unsafe { TfLiteInterpreterGetOutputTensorCount(self.interp) }.max(0) as usize
    }

    /// Copies an already-resized image into input 0. Quantized inputs take
    /// the raw bytes; float inputs get `recipe`.
    pub fn set_input_image(&mut self, rgb: &RgbImage, recipe: Preprocess) -> Result<()> {
        let input = self.input()?;
        let in_bytes = unsafe { TfLiteTensorByteSize(input) };
        let data = unsafe { TfLiteTensorData(input) };
        anyhow::ensure!(!data.is_null(), "null input tensor data");

        match unsafe { TfLiteTensorType(input) } {
            K_TFLITE_UINT8 => {
                let raw = rgb.as_raw();
                anyhow::ensure!(in_bytes == raw.len(), "input tensor is {} bytes, image is {}", in_bytes, raw.len());
                unsafe { ptr::copy_nonoverlapping(raw.as_ptr(), data as *mut u8, raw.len()) };
            }
            K_TFLITE_FLOAT32 => {
                let values = to_input(rgb, recipe);
                let need = values.len() * std::mem::size_of::<f32>();
                anyhow::ensure!(in_bytes == need, "input tensor is {} bytes, image needs {}", in_bytes, need);
                unsafe { ptr::copy_nonoverlapping(values.as_ptr(), data as *mut f32, values.len()) };
            }
            other => anyhow::bail!("unsupported input tensor type {}", other),
        }
        Ok(())
    }

    pub fn invoke(&mut self) -> Result<()> {
        let rc = unsafe { TfLiteInterpreterInvoke(self.interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterInvoke failed");
        Ok(())
    }

    /// Output `index` as floats, dequantizing uint8 tensors.
    pub fn output_f32(&self, index: usize) -> Result<Vec<f32>> {
        let out = self.output(index)?;
        let bytes = unsafe { TfLiteTensorByteSize(out) };
        let data = unsafe { TfLiteTensorData(out) };
        anyhow::ensure!(!data.is_null(), "null output tensor data");

        match unsafe { TfLiteTensorType(out) } {
            K_TFLITE_FLOAT32 => {
                let len = bytes / std::mem::size_of::<f32>();
                Ok(unsafe { std::slice::from_raw_parts(data as *const f32, len) }.to_vec())
            }
            K_TFLITE_UINT8 => {
                let q = unsafe { TfLiteTensorQuantizationParams(out) };
                let raw = unsafe { std::slice::from_raw_parts(data as *const u8, bytes) };
                Ok(dequantize(raw, q.scale, q.zero_point))
            }
            other => anyhow::bail!("unsupported output tensor type {}", other),
        }
    }

    pub fn inspect(&mut self) -> Result<String> {
        let input = self.input()?;
        let mut s = format!(
            "TFLite inspect {}:\n- input[0] dims={:?} type={} bytes={}\n",
            self.path,
            tensor_dims(input),
            unsafe { TfLiteTensorType(input) },
            unsafe { TfLiteTensorByteSize(input) }
        );
        for i in 0..self.output_count() {
            let out = self.output(i)?;
            s.push_str(&format!(
                "- output[{}] dims={:?} type={} bytes={}\n",
                i,
                tensor_dims(out),
                unsafe { TfLiteTensorType(out) },
                unsafe { TfLiteTensorByteSize(out) }
            ));
        }
        Ok(s)
    }
}

fn tensor_dims(t: *const TfLiteTensor) -> Vec<i32> {
    unsafe {
        let nd = TfLiteTensorNumDims(t);
        (0..nd).map(|i| TfLiteTensorDim(t, i)).collect()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        unsafe {
            if !self.interp.is_null() { TfLiteInterpreterDelete(self.interp); }
            if !self.opts.is_null() { TfLiteInterpreterOptionsDelete(self.opts); }
            if !self.model.is_null() { TfLiteModelDelete(self.model); }
        }
        #[cfg(feature = "vision-coral")]
        unsafe {
            if let Some(d) = self.delegate {
                edgetpu_free_delegate(d);
            }
        }
    }
}
