//! Static i18n string tables served to the thin client, which does its own
//! substitution. Unknown languages fall back to English.

type Table = &'static [(&'static str, &'static str)];

static EN: Table = &[
    ("tabs.safe", "🛡️ Safe-AI"),
    ("safe.status.soft", "Software Fallback"),
    ("safe.label.path", "Compute Path"),
    ("safe.path.soft", "Software fallback"),
    ("safe.label.model", "Model"),
    ("safe.label.guards", "Guardrails"),
    ("safe.guard.none", "None"),
    ("safe.send", "Send"),
    ("chat.placeholder", "Type your message… (Enter to send)"),
    ("footer", "Technology with Mercy for Humanity"),
];

static AR: Table = &[
    ("tabs.safe", "🛡️ الذكاء الآمن"),
    ("safe.status.soft", "وضع برمجي"),
    ("safe.label.path", "مسار الحوسبة"),
    ("safe.path.soft", "برمجي احتياطي"),
    ("safe.label.model", "النموذج"),
    ("safe.label.guards", "حواجز الأمان"),
    ("safe.guard.none", "لا يوجد"),
    ("safe.send", "إرسال"),
    ("chat.placeholder", "اكتب رسالتك… (إنتر للإرسال)"),
    ("footer", "تكنولوجيا برحمة من أجل الإنسانية"),
];

static RU: Table = &[
    ("tabs.safe", "🛡️ Безопасный ИИ"),
    ("safe.status.soft", "Программный режим"),
    ("safe.label.path", "Путь вычислений"),
    ("safe.path.soft", "Программный фолбэк"),
    ("safe.label.model", "Модель"),
    ("safe.label.guards", "Ограничители"),
    ("safe.guard.none", "Нет"),
    ("safe.send", "Отправить"),
    ("chat.placeholder", "Введите сообщение… (Enter — отправить)"),
    ("footer", "Технологии с милосердием для человечества"),
];

static ZH: Table = &[
    ("tabs.safe", "🛡️ 安全AI"),
    ("safe.status.soft", "软件回退"),
    ("safe.label.path", "计算路径"),
    ("safe.path.soft", "软件回退"),
    ("safe.label.model", "模型"),
    ("safe.label.guards", "安全护栏"),
    ("safe.guard.none", "无"),
    ("safe.send", "发送"),
    ("chat.placeholder", "输入你的消息…（回车发送）"),
    ("footer", "以仁慈为人类服务的科技"),
];

pub fn table(lang: &str) -> Table {
    match lang {
        "ar" => AR,
        "ru" => RU,
        "zh" => ZH,
        _ => EN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_lang_falls_back_to_english() {
        assert_eq!(table("xx"), table("en"));
        assert_eq!(table(""), EN);
    }

    #[test]
    fn every_table_covers_the_same_keys() {
        let keys: Vec<&str> = EN.iter().map(|(k, _)| *k).collect();

        for lang in ["ar", "ru", "zh"] {
            let theirs: Vec<&str> = table(lang).iter().map(|(k, _)| *k).collect();
            assert_eq!(theirs, keys, "{lang} table keys diverge");
        }
    }
}
