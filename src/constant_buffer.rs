/// D3D12_CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Size of one constant buffer element, rounded up to the placement alignment.
/// Every element takes at least one aligned block, even a zero sized one.
pub const fn aligned_element_size(size: usize) -> usize {
    if size == 0 {
        return CONSTANT_BUFFER_ALIGNMENT;
    }
    (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

#[cfg(windows)]
pub use upload::ConstantBuffer;

#[cfg(windows)]
mod upload {
    use std::marker::PhantomData;

    use windows::Win32::Graphics::Direct3D12::*;

    use super::aligned_element_size;
    use crate::error::{Error, Result};
    use crate::gpulib::GPULib;

    /// Upload heap buffer holding `count` elements of `T`, each padded to the constant buffer
    /// alignment. It stays mapped for its whole lifetime.
    pub struct ConstantBuffer<T> {
        resource: ID3D12Resource,
        mapped: *mut u8,
        count: usize,
        element_size: usize,
        data_type: PhantomData<T>,
    }

    impl<T: bytemuck::Pod> ConstantBuffer<T> {
        pub fn new(lib: &GPULib, count: usize, name: &str) -> Result<Self> {
            let element_size = aligned_element_size(size_of::<T>());

            let resource = lib.create_buffer(
                D3D12_HEAP_TYPE_UPLOAD,
                count.max(1) * element_size,
                D3D12_RESOURCE_STATE_GENERIC_READ,
                name,
            )?;

            // Upload heaps may stay mapped while the GPU reads them
            let mut pointer = std::ptr::null_mut();
            unsafe { resource.Map(0, None, Some(&mut pointer)) }?;

            Ok(ConstantBuffer {
                resource,
                mapped: pointer as *mut u8,
                count,
                element_size,
                data_type: PhantomData,
            })
        }

        pub fn write(&mut self, index: usize, value: &T) -> Result<()> {
            if index >= self.count {
                return Err(Error::IndexOutOfRange {
                    index,
                    count: self.count,
                });
            }

            let bytes = bytemuck::bytes_of(value);
            unsafe {
                let destination = self.mapped.add(index * self.element_size);
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), destination, bytes.len());
            }
            Ok(())
        }
    }

    impl<T> ConstantBuffer<T> {
        pub fn element_address(&self, index: usize) -> u64 {
            unsafe { self.resource.GetGPUVirtualAddress() + (index * self.element_size) as u64 }
        }

        pub fn len(&self) -> usize {
            self.count
        }

        pub fn is_empty(&self) -> bool {
            self.count == 0
        }

        pub fn resource(&self) -> &ID3D12Resource {
            &self.resource
        }
    }

    impl<T> Drop for ConstantBuffer<T> {
        fn drop(&mut self) {
            unsafe { self.resource.Unmap(0, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_round_up_to_alignment() {
        assert_eq!(aligned_element_size(1), 256);
        assert_eq!(aligned_element_size(64), 256);
        assert_eq!(aligned_element_size(256), 256);
        assert_eq!(aligned_element_size(257), 512);
        // Pass constants with a full light array
        assert_eq!(aligned_element_size(1328), 1536);
    }

    #[test]
    fn zero_sized_elements_take_one_block() {
        assert_eq!(aligned_element_size(0), CONSTANT_BUFFER_ALIGNMENT);
        assert_eq!(aligned_element_size(size_of::<()>()), 256);
    }
}
