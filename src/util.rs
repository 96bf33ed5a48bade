use log::*;

use crate::{
    ptp::{DeviceInfo, DevicePropDesc, ObjectInfo, PropValue, PtpProtocol},
    session::Session,
    transport::Transport,
    CamError, CamResult,
};

/// This trait provides convenience queries on top of an open [`Session`].
pub trait CamUtil {
    /// Operation codes the camera supports.
    fn list_operations(&mut self) -> CamResult<Vec<u16>>;

    /// Device property codes the camera supports.
    fn list_properties(&mut self) -> CamResult<Vec<u16>>;

    /// Lists all objects except associations.
    /// Fails on the first object whose info cannot be read.
    fn list_files(&mut self) -> CamResult<Vec<ObjectInfo>>;

    /// Describes a property. Fails with [`CamError::PropertyNotSupported`] if the camera
    /// does not list it.
    fn property(&mut self, code: u16) -> CamResult<DevicePropDesc>;

    /// Parses `value` according to the property's data type and sets it.
    ///
    /// Returns the value that was sent.
    fn set_property(&mut self, code: u16, value: &str) -> CamResult<PropValue>;

    /// Current values of all supported properties for which `include` returns `true`.
    ///
    /// * `include` - Filter on the property code, e.g. to keep only codes without a known name.
    fn property_values(&mut self, include: impl FnMut(u16) -> bool) -> CamResult<Vec<(u16, PropValue)>>;
}

impl<T: Transport, P: PtpProtocol> CamUtil for Session<T, P> {
    fn list_operations(&mut self) -> CamResult<Vec<u16>> {
        let info = camera_info(self)?;
        Ok(info.operations_supported)
    }

    fn list_properties(&mut self) -> CamResult<Vec<u16>> {
        let info = camera_info(self)?;
        Ok(info.device_properties_supported)
    }

    fn list_files(&mut self) -> CamResult<Vec<ObjectInfo>> {
        camera_info(self)?;

        let handles = self
            .object_handles()
            .inspect_err(|e| error!("Could not get object handles: {e}"))
            .inspect_err(|e| self.recover(e))?;

        let mut files = Vec::with_capacity(handles.len());

        for handle in handles {
            let info = self
                .object_info(handle)
                .inspect_err(|e| error!("Could not get object info of 0x{handle:08x}: {e}"))
                .inspect_err(|e| self.recover(e))?;

            if info.is_association() {
                continue;
            }

            trace!("0x{handle:08x}: {:>12}\t{}", info.compressed_size, info.filename);
            files.push(info);
        }

        Ok(files)
    }

    fn property(&mut self, code: u16) -> CamResult<DevicePropDesc> {
        let info = camera_info(self)?;

        if !info.supports_property(code) {
            error!("The device does not support property 0x{code:04x}!");
            return Err(CamError::PropertyNotSupported { code });
        }

        let desc = self.prop_desc(code).inspect_err(|e| {
            error!("Could not get device property description of 0x{code:04x}: {e}")
        })?;

        debug!("Property 0x{code:04x}: data type 0x{:04x}, current {:?}", desc.data_type, desc.current);

        Ok(desc)
    }

    fn set_property(&mut self, code: u16, value: &str) -> CamResult<PropValue> {
        let desc = self.property(code)?;

        if !desc.settable {
            warn!("Property 0x{code:04x} is read only, trying anyway");
        }

        let parsed = PropValue::parse(desc.data_type, value)?;

        info!("Setting property 0x{code:04x} value to '{value}'");

        self.set_prop_value(code, &parsed)
            .inspect_err(|e| error!("Could not set property 0x{code:04x}: {e}"))?;

        Ok(parsed)
    }

    fn property_values(&mut self, mut include: impl FnMut(u16) -> bool) -> CamResult<Vec<(u16, PropValue)>> {
        let info = camera_info(self)?;

        let mut values = Vec::new();

        for code in info.device_properties_supported.into_iter().filter(|c| include(*c)) {
            let desc = self.prop_desc(code).inspect_err(|e| {
                error!("Could not get device property description of 0x{code:04x}: {e}")
            })?;

            values.push((code, desc.current));
        }

        Ok(values)
    }
}

fn camera_info<T: Transport, P: PtpProtocol>(session: &mut Session<T, P>) -> CamResult<DeviceInfo> {
    let info = session
        .device_info()
        .inspect_err(|e| error!("Could not get device info: {e}"))
        .inspect_err(|e| session.recover(e))?;

    debug!("Camera: {}", info.model);

    Ok(info)
}
