#![allow(dead_code)]

pub use log::info;

pub use candle_seq::{candle_core, candle_nn};

use candle_seq::candle_core::Device;
use clap::ValueEnum;

pub const DEFAULT_EPOCHS: usize = 10;
pub const DEFAULT_MINIBATCH: usize = 64;

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

pub fn select_device(device: &ComputeDevice, device_no: usize) -> anyhow::Result<Device> {
    match device {
        ComputeDevice::Cpu => Ok(Device::Cpu),
        ComputeDevice::Cuda => Ok(Device::new_cuda(device_no)?),
        ComputeDevice::Metal => Ok(Device::new_metal(device_no)?),
    }
}
