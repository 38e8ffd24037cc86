use crate::frame_counter::slot_label;
use crate::sync_device::{FrameSyncDevice, IdleToken};

/// 一个 frame in flight 所需的同步对象
pub struct FrameSlot<D: FrameSyncDevice> {
    /// swapchain 交出 image 之后 signal
    pub image_acquired: D::Semaphore,
    /// 渲染结束后 signal，present 等待它
    pub render_complete: D::Semaphore,
    /// 渲染结束后 signal，CPU 等待它。创建时就是 signaled 状态
    pub in_flight: D::Fence,
}
// new & init
impl<D: FrameSyncDevice> FrameSlot<D> {
    /// 任意一个对象创建失败时，已经创建的对象会在 wait idle 之后销毁
    pub fn new(device: &mut D, slot: usize) -> Result<Self, D::Error> {
        let label = slot_label(slot);
        let image_acquired = device.create_semaphore(&format!("image-acquired-{label}"))?;
        let render_complete = match device.create_semaphore(&format!("render-complete-{label}")) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                release_semaphores(device, vec![image_acquired]);
                return Err(e);
            }
        };
        let in_flight = match device.create_fence(true, &format!("in-flight-{label}")) {
            Ok(fence) => fence,
            Err(e) => {
                release_semaphores(device, vec![image_acquired, render_complete]);
                return Err(e);
            }
        };
        Ok(Self {
            image_acquired,
            render_complete,
            in_flight,
        })
    }
}

/// 释放过程中的错误只记录日志，调用者返回的是创建时的错误
fn release_semaphores<D: FrameSyncDevice>(device: &mut D, semaphores: Vec<D::Semaphore>) {
    let idle = match device.wait_idle() {
        Ok(idle) => idle,
        Err(e) => {
            log::error!("failed to wait idle, {} semaphores leaked: {}", semaphores.len(), e);
            return;
        }
    };
    for semaphore in semaphores {
        if let Err(e) = device.destroy_semaphore(semaphore, &idle) {
            log::error!("failed to destroy semaphore: {}", e);
        }
    }
}
// destroy
impl<D: FrameSyncDevice> FrameSlot<D> {
    /// 每个对象都会尝试销毁，返回第一个错误
    pub fn destroy(self, device: &mut D, idle: &IdleToken) -> Result<(), D::Error> {
        let results = [
            device.destroy_fence(self.in_flight, idle),
            device.destroy_semaphore(self.render_complete, idle),
            device.destroy_semaphore(self.image_acquired, idle),
        ];
        results.into_iter().collect()
    }
}
