use crate::math::Vec3;
use crate::sort::CameraPose;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            forward: Vec3::new(0.0, 0.0, -1.0),
            yaw,
            pitch,
        };
        camera.update_vectors();
        camera
    }

    pub fn update_vectors(&mut self) {
        self.forward = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize();
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose::new(self.position, self.forward)
    }
}

pub fn look_at_target(camera: &mut Camera, target: Vec3) {
    let to_target = (target - camera.position).normalize();
    if to_target.length_squared() < 1e-8 {
        return;
    }
    camera.yaw = to_target.z.atan2(to_target.x);
    camera.pitch = to_target.y.clamp(-1.0, 1.0).asin();
    camera.update_vectors();
}

/// Circular orbit around `target` in the XZ plane, always facing it.
#[derive(Debug, Clone, Copy)]
pub struct Orbit {
    pub target: Vec3,
    pub radius: f32,
    pub height: f32,
    pub angle: f32,
}

impl Orbit {
    pub fn advance(&mut self, camera: &mut Camera, delta_angle: f32) {
        self.angle += delta_angle;
        camera.position = Vec3::new(
            self.target.x + self.radius * self.angle.cos(),
            self.target.y + self.height,
            self.target.z + self.radius * self.angle.sin(),
        );
        look_at_target(camera, self.target);
    }
}
